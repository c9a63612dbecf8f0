//! Deterministic truncation of text ahead of synthesis

use std::borrow::Cow;

/// Default character budget for text sent to TTS
pub const MAX_TTS_CHARS: usize = 500;

/// Truncate `text` to at most `max_chars` characters
///
/// Counts Unicode scalar values and cuts at a plain prefix, with no attempt
/// to respect word or sentence boundaries. Returns the (possibly shortened)
/// text and whether anything was removed.
#[must_use]
pub fn trim_for_tts(text: &str, max_chars: usize) -> (Cow<'_, str>, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (Cow::Borrowed(&text[..cut]), true),
        None => (Cow::Borrowed(text), false),
    }
}

/// Take the first `max_chars` characters of `text`
///
/// Same cut as [`trim_for_tts`] without the flag, for previews.
#[must_use]
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(cut, _)| &text[..cut])
}

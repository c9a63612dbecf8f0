//! Voice processing module
//!
//! Text trimming, audio formats and the streaming TTS relay. Provider
//! clients live in `providers`.

mod format;
pub mod relay;
mod trim;

pub use format::OutputFormat;
pub use relay::{DEFAULT_TTS_RETRIES, TtsRequest, stream_tts};
pub use trim::{MAX_TTS_CHARS, char_prefix, trim_for_tts};

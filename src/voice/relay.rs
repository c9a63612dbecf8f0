//! Retrying relay between a TTS provider stream and the client
//!
//! The relay opens a provider stream and forwards its chunks as they
//! arrive. Only the window before an attempt's first chunk is retried:
//! once any audio has gone downstream, a failure ends the stream so the
//! client never hears the same audio twice.
//!
//! ```text
//!   ┌──────────────┐ first chunk ┌───────────┐ exhausted ┌──────┐
//!   │ Establishing │────────────▶│ Streaming │──────────▶│ Done │
//!   └──────┬───────┘             └─────┬─────┘           └──────┘
//!          │ fail, budget left         │ fail
//!          └──▶ reopen                 └──▶ emit error, Done
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, stream};

use super::OutputFormat;
use crate::providers::{AudioChunkStream, SpeechStreamer};
use crate::Result;

/// Default number of extra attempts at opening a TTS stream
pub const DEFAULT_TTS_RETRIES: u32 = 2;

/// A single streaming synthesis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsRequest {
    /// Text to synthesize (already trimmed)
    pub text: String,
    /// Provider voice identifier
    pub voice_id: String,
    /// Provider TTS model identifier
    pub model_id: String,
    /// Encoded audio format to request
    pub output_format: OutputFormat,
    /// Extra open attempts allowed after the first one fails
    pub retry_budget: u32,
}

enum Phase {
    Establishing,
    Streaming(AudioChunkStream),
    Done,
}

struct Relay {
    source: Arc<dyn SpeechStreamer>,
    request: TtsRequest,
    attempts: u32,
    delivered: usize,
    phase: Phase,
}

/// Stream synthesized audio for `request` from `source`
///
/// The returned stream is lazy: nothing is sent to the provider until it
/// is first polled. It yields chunks in provider order and ends after the
/// provider stream is exhausted or after the first error it yields.
#[must_use]
pub fn stream_tts(source: Arc<dyn SpeechStreamer>, request: TtsRequest) -> AudioChunkStream {
    let relay = Relay {
        source,
        request,
        attempts: 0,
        delivered: 0,
        phase: Phase::Establishing,
    };

    stream::unfold(relay, Relay::step).boxed()
}

impl Relay {
    async fn step(mut self) -> Option<(Result<Bytes>, Self)> {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Establishing => self.establish().await,
            Phase::Streaming(stream) => self.forward(stream).await,
            Phase::Done => None,
        }
    }

    async fn establish(mut self) -> Option<(Result<Bytes>, Self)> {
        loop {
            self.attempts += 1;

            let error = match self.source.open_stream(&self.request).await {
                Ok(mut stream) => match next_chunk(&mut stream).await {
                    Some(Ok(chunk)) => {
                        tracing::debug!(
                            attempt = self.attempts,
                            format = %self.request.output_format,
                            "TTS stream established"
                        );
                        self.delivered += chunk.len();
                        self.phase = Phase::Streaming(stream);
                        return Some((Ok(chunk), self));
                    }
                    Some(Err(e)) => e,
                    None => {
                        tracing::debug!(attempt = self.attempts, "TTS stream ended without audio");
                        return None;
                    }
                },
                Err(e) => e,
            };

            if !error.is_transient() || self.attempts > self.request.retry_budget {
                tracing::error!(
                    attempts = self.attempts,
                    error = %error,
                    "TTS stream could not be established"
                );
                return Some((Err(error), self));
            }

            tracing::warn!(
                attempt = self.attempts,
                budget = self.request.retry_budget,
                error = %error,
                "TTS stream failed to start, retrying"
            );
        }
    }

    async fn forward(mut self, mut stream: AudioChunkStream) -> Option<(Result<Bytes>, Self)> {
        match next_chunk(&mut stream).await {
            Some(Ok(chunk)) => {
                self.delivered += chunk.len();
                self.phase = Phase::Streaming(stream);
                Some((Ok(chunk), self))
            }
            Some(Err(e)) => {
                tracing::error!(
                    delivered_bytes = self.delivered,
                    error = %e,
                    "TTS stream failed mid-delivery"
                );
                Some((Err(e), self))
            }
            None => {
                tracing::debug!(
                    attempts = self.attempts,
                    delivered_bytes = self.delivered,
                    "TTS stream complete"
                );
                None
            }
        }
    }
}

/// Next non-empty chunk, or the stream's error/end
async fn next_chunk(stream: &mut AudioChunkStream) -> Option<Result<Bytes>> {
    loop {
        match stream.next().await {
            Some(Ok(chunk)) if chunk.is_empty() => {}
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::Error;

    /// What one call to `open_stream` produces
    enum Attempt {
        /// Opening fails outright
        Refuse,
        /// Opening succeeds; the stream yields these items in order
        Serve(Vec<Result<Bytes>>),
    }

    struct ScriptedSource {
        script: Mutex<VecDeque<Attempt>>,
        opened: AtomicU32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Attempt>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                opened: AtomicU32::new(0),
            })
        }

        fn opened(&self) -> u32 {
            self.opened.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechStreamer for ScriptedSource {
        async fn open_stream(&self, _request: &TtsRequest) -> Result<AudioChunkStream> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Attempt::Serve(items)) => Ok(stream::iter(items).boxed()),
                Some(Attempt::Refuse) => Err(Error::Tts(format!("refused attempt {n}"))),
                None => Err(Error::Tts("script exhausted".to_string())),
            }
        }
    }

    fn request(retry_budget: u32) -> TtsRequest {
        TtsRequest {
            text: "hello".to_string(),
            voice_id: "voice".to_string(),
            model_id: "model".to_string(),
            output_format: OutputFormat::default(),
            retry_budget,
        }
    }

    fn chunk(bytes: &'static [u8]) -> Result<Bytes> {
        Ok(Bytes::from_static(bytes))
    }

    async fn drain(mut relay: AudioChunkStream) -> (Vec<Bytes>, Option<Error>) {
        let mut chunks = Vec::new();
        while let Some(item) = relay.next().await {
            match item {
                Ok(c) => chunks.push(c),
                Err(e) => return (chunks, Some(e)),
            }
        }
        (chunks, None)
    }

    #[tokio::test]
    async fn relays_chunks_in_order() {
        let source = ScriptedSource::new(vec![Attempt::Serve(vec![
            chunk(b"one"),
            chunk(b"two"),
            chunk(b"three"),
        ])]);

        let (chunks, error) = drain(stream_tts(source.clone(), request(2))).await;

        assert!(error.is_none());
        assert_eq!(chunks, vec!["one", "two", "three"]);
        assert_eq!(source.opened(), 1);
    }

    #[tokio::test]
    async fn recovers_after_budget_failures() {
        for budget in 0..4 {
            let mut script: Vec<Attempt> = (0..budget).map(|_| Attempt::Refuse).collect();
            script.push(Attempt::Serve(vec![chunk(b"ok")]));
            let source = ScriptedSource::new(script);

            let (chunks, error) = drain(stream_tts(source.clone(), request(budget))).await;

            assert!(error.is_none(), "budget {budget}: {error:?}");
            assert_eq!(chunks, vec!["ok"]);
            assert_eq!(source.opened(), budget + 1);
        }
    }

    #[tokio::test]
    async fn gives_up_after_budget_plus_one() {
        for budget in 0..4 {
            let script = (0..=budget + 2).map(|_| Attempt::Refuse).collect();
            let source = ScriptedSource::new(script);

            let (chunks, error) = drain(stream_tts(source.clone(), request(budget))).await;

            assert!(chunks.is_empty());
            let message = error.expect("relay should fail").to_string();
            assert!(
                message.contains(&format!("refused attempt {}", budget + 1)),
                "final error surfaced: {message}"
            );
            assert_eq!(source.opened(), budget + 1);
        }
    }

    #[tokio::test]
    async fn mid_stream_failure_is_not_retried() {
        let source = ScriptedSource::new(vec![
            Attempt::Serve(vec![chunk(b"A"), Err(Error::Tts("connection reset".to_string()))]),
            Attempt::Serve(vec![chunk(b"A"), chunk(b"B")]),
        ]);

        let (chunks, error) = drain(stream_tts(source.clone(), request(2))).await;

        assert_eq!(chunks, vec!["A"]);
        assert!(matches!(error, Some(Error::Tts(_))));
        assert_eq!(source.opened(), 1);
    }

    #[tokio::test]
    async fn failure_before_first_chunk_is_retried() {
        let source = ScriptedSource::new(vec![
            Attempt::Serve(vec![Err(Error::Tts("body read failed".to_string()))]),
            Attempt::Serve(vec![chunk(b"fresh")]),
        ]);

        let (chunks, error) = drain(stream_tts(source.clone(), request(1))).await;

        assert!(error.is_none());
        assert_eq!(chunks, vec!["fresh"]);
        assert_eq!(source.opened(), 2);
    }

    #[tokio::test]
    async fn configuration_error_is_not_retried() {
        struct Unconfigured(AtomicU32);

        #[async_trait]
        impl SpeechStreamer for Unconfigured {
            async fn open_stream(&self, _request: &TtsRequest) -> Result<AudioChunkStream> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(Error::Config("no key".to_string()))
            }
        }

        let source = Arc::new(Unconfigured(AtomicU32::new(0)));
        let (_, error) = drain(stream_tts(source.clone(), request(5))).await;

        assert!(matches!(error, Some(Error::Config(_))));
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_stream_ends_cleanly() {
        let source = ScriptedSource::new(vec![Attempt::Serve(vec![])]);

        let (chunks, error) = drain(stream_tts(source.clone(), request(2))).await;

        assert!(chunks.is_empty());
        assert!(error.is_none());
        assert_eq!(source.opened(), 1);
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let source = ScriptedSource::new(vec![Attempt::Serve(vec![
            chunk(b""),
            chunk(b"a"),
            chunk(b""),
            chunk(b"b"),
        ])]);

        let (chunks, _) = drain(stream_tts(source, request(0))).await;

        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[test]
    fn relay_is_lazy() {
        let source = ScriptedSource::new(vec![Attempt::Serve(vec![chunk(b"x")])]);

        let mut relay = stream_tts(source.clone(), request(0));
        assert_eq!(source.opened(), 0);

        let first = tokio_test::block_on(relay.next());
        assert!(matches!(first, Some(Ok(_))));
        assert_eq!(source.opened(), 1);
        assert!(tokio_test::block_on(relay.next()).is_none());
    }
}

//! Upstream AI provider clients
//!
//! Each capability the gateway needs is a trait so handlers can be driven
//! by any backend (or a stub in tests):
//!
//! - [`ChatProvider`]: chat completion (`OpenAI`)
//! - [`Transcriber`]: speech-to-text (`OpenAI` Whisper)
//! - [`SpeechSynthesizer`]: whole-reply speech synthesis (`OpenAI` TTS)
//! - [`SpeechStreamer`]: streaming speech synthesis (ElevenLabs)

pub mod elevenlabs;
pub mod openai;
pub mod retry;

pub use elevenlabs::ElevenLabsClient;
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::Result;
use crate::chat::Conversation;
use crate::voice::TtsRequest;

/// Lazily produced sequence of encoded audio chunks
pub type AudioChunkStream = BoxStream<'static, Result<Bytes>>;

/// Chat completion provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Produce the assistant's next message for a conversation
    ///
    /// # Errors
    ///
    /// Returns error if the provider call fails
    async fn complete(&self, conversation: &Conversation) -> Result<String>;
}

/// Speech-to-text provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe encoded audio to text
    ///
    /// # Errors
    ///
    /// Returns error if the provider call fails
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Text-to-speech provider returning one complete clip
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into a single encoded audio blob
    ///
    /// # Errors
    ///
    /// Returns error if the provider call fails
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

/// Text-to-speech provider that streams audio as it is generated
#[async_trait]
pub trait SpeechStreamer: Send + Sync {
    /// Open one provider stream for `request`
    ///
    /// A single attempt with no retries; see [`crate::voice::stream_tts`]
    /// for the retrying relay.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened
    async fn open_stream(&self, request: &TtsRequest) -> Result<AudioChunkStream>;
}

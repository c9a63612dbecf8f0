//! Error types for Chorus gateway

use thiserror::Error;

/// Result type alias for Chorus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Chorus gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, invalid setting)
    #[error("configuration error: {0}")]
    Config(String),

    /// The language model answered with nothing usable
    #[error("empty reply from model")]
    EmptyReply,

    /// Chat completion provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Streaming text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Whole-reply speech synthesis error
    #[error("speech synthesis error: {0}")]
    Speech(String),

    /// Client supplied audio that could not be decoded
    #[error("audio error: {0}")]
    Audio(String),

    /// Malformed message on a persistent channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error (binding or serving the listener)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether repeating the same call could succeed
    ///
    /// Configuration problems are permanent for the life of the process.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

//! Audio output formats offered by the streaming TTS provider

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Encoded audio format requested from the TTS provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// MP3, 44.1 kHz, 128 kbps
    #[default]
    #[serde(rename = "mp3_44100_128")]
    Mp3_44100_128,
    /// MP3, 22.05 kHz, 32 kbps
    #[serde(rename = "mp3_22050_32")]
    Mp3_22050_32,
    /// WAV, 44.1 kHz
    #[serde(rename = "wav_44100")]
    Wav44100,
    /// Raw 16-bit linear PCM, 16 kHz
    #[serde(rename = "pcm_16000")]
    Pcm16000,
}

impl OutputFormat {
    /// All accepted formats
    pub const ALL: [Self; 4] = [
        Self::Mp3_44100_128,
        Self::Mp3_22050_32,
        Self::Wav44100,
        Self::Pcm16000,
    ];

    /// Provider identifier for this format
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp3_44100_128 => "mp3_44100_128",
            Self::Mp3_22050_32 => "mp3_22050_32",
            Self::Wav44100 => "wav_44100",
            Self::Pcm16000 => "pcm_16000",
        }
    }

    /// HTTP media type for a response carrying this format
    ///
    /// PCM is raw and most browsers won't play it directly.
    #[must_use]
    pub fn media_type(self) -> &'static str {
        let id = self.as_str();
        if id.starts_with("mp3") {
            "audio/mpeg"
        } else if id.starts_with("wav") {
            "audio/wav"
        } else {
            "audio/L16"
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unsupported output format: {s}")))
    }
}

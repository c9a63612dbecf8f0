//! TOML configuration file loading
//!
//! Supports `~/.config/chorus/config.toml` (or `$CHORUS_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ChorusConfigFile {
    /// API keys for upstream providers
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Chat completion configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Streaming TTS configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Voice channel configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,

    /// Directory served under `/realtime`
    pub static_dir: Option<PathBuf>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Default model (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// Trailing messages forwarded to the model
    pub max_context: Option<usize>,

    /// Completion token limit
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Retries on transient provider failures
    pub max_retries: Option<u32>,

    /// `OpenAI`-compatible API base URL
    pub base_url: Option<String>,
}

/// Streaming TTS configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub output_format: Option<String>,

    /// Character budget applied before synthesis
    pub max_chars: Option<usize>,

    /// Extra attempts at establishing a stream
    pub retries: Option<u32>,

    /// `ElevenLabs` API base URL
    pub base_url: Option<String>,
}

/// Voice channel configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Reply speech model (e.g. "tts-1")
    pub speech_model: Option<String>,

    /// Reply speech voice (e.g. "alloy")
    pub speech_voice: Option<String>,

    /// Reply speech format (e.g. "mp3")
    pub speech_format: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ChorusConfigFile::default()` if there is no usable path.
#[must_use]
pub fn load_config_file() -> ChorusConfigFile {
    config_file_path().map_or_else(ChorusConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `ChorusConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_from(path: &Path) -> ChorusConfigFile {
    if !path.exists() {
        return ChorusConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ChorusConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ChorusConfigFile::default()
        }
    }
}

/// Return the config file path: `$CHORUS_CONFIG` or `~/.config/chorus/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHORUS_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("chorus").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_from(&dir.path().join("absent.toml"));
        assert!(fc.llm.model.is_none());
        assert!(fc.server.port.is_none());
    }

    #[test]
    fn partial_file_is_an_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 9000

[tts]
voice_id = "custom-voice"
retries = 4
"#
        )
        .unwrap();

        let fc = load_config_from(file.path());
        assert_eq!(fc.server.port, Some(9000));
        assert_eq!(fc.tts.voice_id.as_deref(), Some("custom-voice"));
        assert_eq!(fc.tts.retries, Some(4));
        assert!(fc.tts.model_id.is_none());
        assert!(fc.api_keys.openai.is_none());
    }

    #[test]
    fn unparsable_file_yields_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\nport = ").unwrap();

        let fc = load_config_from(file.path());
        assert!(fc.server.port.is_none());
    }
}

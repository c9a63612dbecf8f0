//! Configuration management for Chorus gateway

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::chat::{ChatDefaults, DEFAULT_MAX_CONTEXT, DEFAULT_MODEL};
use crate::voice::{DEFAULT_TTS_RETRIES, MAX_TTS_CHARS, OutputFormat};
use crate::{Error, Result};

use file::ChorusConfigFile;

/// Default ElevenLabs voice
pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

/// Default ElevenLabs TTS model
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

/// Chorus gateway configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Chat completion configuration
    pub llm: LlmConfig,

    /// Streaming TTS configuration
    pub tts: TtsConfig,

    /// Voice channel configuration
    pub voice: VoiceConfig,
}

/// API keys for upstream providers
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper and reply speech)
    pub openai: Option<SecretString>,

    /// `ElevenLabs` API key (streaming TTS)
    pub elevenlabs: Option<SecretString>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: None,
        }
    }
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Default model identifier
    pub model: String,

    /// Default context window (trailing messages)
    pub max_context: usize,

    /// Completion token limit
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-request timeout
    pub timeout: Duration,

    /// Retries on transient provider failures
    pub max_retries: u32,

    /// `OpenAI`-compatible API base URL
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_context: DEFAULT_MAX_CONTEXT,
            max_tokens: 200,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl LlmConfig {
    /// Defaults applied to chat requests
    #[must_use]
    pub fn chat_defaults(&self) -> ChatDefaults {
        ChatDefaults {
            model: self.model.clone(),
            max_context: self.max_context,
        }
    }
}

/// Streaming TTS configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Default voice identifier
    pub voice_id: String,

    /// Default TTS model identifier
    pub model_id: String,

    /// Default output format
    pub output_format: OutputFormat,

    /// Character budget applied before synthesis
    pub max_chars: usize,

    /// Extra attempts at establishing a stream
    pub retries: u32,

    /// `ElevenLabs` API base URL
    pub base_url: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_TTS_MODEL.to_string(),
            output_format: OutputFormat::default(),
            max_chars: MAX_TTS_CHARS,
            retries: DEFAULT_TTS_RETRIES,
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }
}

/// Voice channel configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model for Whisper
    pub stt_model: String,

    /// Model for whole-reply speech synthesis
    pub speech_model: String,

    /// Voice for whole-reply speech synthesis
    pub speech_voice: String,

    /// Encoded format of synthesized replies
    pub speech_format: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            speech_model: "tts-1".to_string(),
            speech_voice: "alloy".to_string(),
            speech_format: "mp3".to_string(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a setting holds an unusable value
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the TTS output format is not a supported value
    pub fn from_sources<F>(fc: ChorusConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: var("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            elevenlabs: var("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
        };

        // API server config (env > toml > default)
        let api_server = ApiServerConfig {
            host: var("CHORUS_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.api_server.host),
            port: parsed(var("CHORUS_PORT").or_else(|| var("PORT")), "CHORUS_PORT")
                .or(fc.server.port)
                .unwrap_or(defaults.api_server.port),
            static_dir: var("CHORUS_STATIC_DIR")
                .map(PathBuf::from)
                .or(fc.server.static_dir),
        };

        let llm = LlmConfig {
            model: var("CHORUS_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            max_context: fc.llm.max_context.unwrap_or(defaults.llm.max_context),
            max_tokens: fc.llm.max_tokens.unwrap_or(defaults.llm.max_tokens),
            temperature: fc.llm.temperature.unwrap_or(defaults.llm.temperature),
            timeout: parsed(var("CHORUS_LLM_TIMEOUT_SECS"), "CHORUS_LLM_TIMEOUT_SECS")
                .or(fc.llm.timeout_secs)
                .map_or(defaults.llm.timeout, Duration::from_secs),
            max_retries: fc.llm.max_retries.unwrap_or(defaults.llm.max_retries),
            base_url: var("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or(defaults.llm.base_url),
        };

        let output_format = match var("CHORUS_TTS_OUTPUT_FORMAT").or(fc.tts.output_format) {
            Some(s) => OutputFormat::from_str(&s)?,
            None => defaults.tts.output_format,
        };

        let tts = TtsConfig {
            voice_id: var("CHORUS_TTS_VOICE_ID")
                .or(fc.tts.voice_id)
                .unwrap_or(defaults.tts.voice_id),
            model_id: var("CHORUS_TTS_MODEL_ID")
                .or(fc.tts.model_id)
                .unwrap_or(defaults.tts.model_id),
            output_format,
            max_chars: parsed(var("CHORUS_TTS_MAX_CHARS"), "CHORUS_TTS_MAX_CHARS")
                .or(fc.tts.max_chars)
                .unwrap_or(defaults.tts.max_chars),
            retries: parsed(var("CHORUS_TTS_RETRIES"), "CHORUS_TTS_RETRIES")
                .or(fc.tts.retries)
                .unwrap_or(defaults.tts.retries),
            base_url: var("ELEVENLABS_BASE_URL")
                .or(fc.tts.base_url)
                .unwrap_or(defaults.tts.base_url),
        };

        let voice = VoiceConfig {
            stt_model: var("CHORUS_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.voice.stt_model),
            speech_model: fc.voice.speech_model.unwrap_or(defaults.voice.speech_model),
            speech_voice: fc.voice.speech_voice.unwrap_or(defaults.voice.speech_voice),
            speech_format: fc.voice.speech_format.unwrap_or(defaults.voice.speech_format),
        };

        Ok(Self {
            api_keys,
            api_server,
            llm,
            tts,
            voice,
        })
    }

    /// `OpenAI` key, required for chat and the voice channel
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `OPENAI_API_KEY` is not set
    pub fn require_openai_key(&self) -> Result<&SecretString> {
        self.api_keys
            .openai
            .as_ref()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))
    }

    /// Whether streaming TTS can be served
    #[must_use]
    pub const fn has_tts_stream(&self) -> bool {
        self.api_keys.elevenlabs.is_some()
    }
}

/// Parse an env value, warning on (and ignoring) values that don't parse
fn parsed<T: FromStr>(value: Option<String>, key: &str) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring invalid config value");
            None
        }
    }
}

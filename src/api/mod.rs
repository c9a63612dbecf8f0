//! HTTP API server for Chorus gateway

pub mod chat;
pub mod health;
pub mod voice_ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderName;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::ChatDefaults;
use crate::config::{Config, TtsConfig};
use crate::providers::{
    ChatProvider, ElevenLabsClient, OpenAiClient, SpeechStreamer, SpeechSynthesizer, Transcriber,
};
use crate::Result;

/// Header carrying the URL-encoded reply text on streamed audio responses
pub const AGENT_TEXT_HEADER: &str = "x-agent-text";

/// Header flagging whether the reply was cut before synthesis
pub const TEXT_TRUNCATED_HEADER: &str = "x-text-truncated";

/// Shared state for API handlers
///
/// Provider handles are built once at startup and never mutated.
#[derive(Clone)]
pub struct ApiState {
    pub chat: Arc<dyn ChatProvider>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Streaming TTS source; absent when no `ElevenLabs` key is configured
    pub speech_stream: Option<Arc<dyn SpeechStreamer>>,
    pub chat_defaults: ChatDefaults,
    pub tts: TtsConfig,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    chat: Arc<dyn ChatProvider>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speech_stream: Option<Arc<dyn SpeechStreamer>>,
    chat_defaults: ChatDefaults,
    tts: TtsConfig,
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            chat,
            transcriber,
            synthesizer,
            speech_stream: None,
            chat_defaults: ChatDefaults::default(),
            tts: TtsConfig::default(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: None,
        }
    }

    /// Create a builder wired to the real providers
    ///
    /// # Errors
    ///
    /// Returns error if the `OpenAI` key is missing or a client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let openai = Arc::new(OpenAiClient::from_config(config)?);
        let speech_stream = ElevenLabsClient::from_config(config)?
            .map(|client| Arc::new(client) as Arc<dyn SpeechStreamer>);

        if speech_stream.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY not set, streamed audio chat is disabled");
        }

        let mut builder = Self::new(openai.clone(), openai.clone(), openai)
            .chat_defaults(config.llm.chat_defaults())
            .tts_config(config.tts.clone())
            .host(config.api_server.host.clone())
            .port(config.api_server.port)
            .static_dir(config.api_server.static_dir.clone());
        builder.speech_stream = speech_stream;

        Ok(builder)
    }

    /// Set the streaming TTS source
    #[must_use]
    pub fn speech_stream(mut self, source: Arc<dyn SpeechStreamer>) -> Self {
        self.speech_stream = Some(source);
        self
    }

    /// Set the defaults applied to chat requests
    #[must_use]
    pub fn chat_defaults(mut self, defaults: ChatDefaults) -> Self {
        self.chat_defaults = defaults;
        self
    }

    /// Set the streaming TTS defaults
    #[must_use]
    pub fn tts_config(mut self, tts: TtsConfig) -> Self {
        self.tts = tts;
        self
    }

    /// Set the bind address
    #[must_use]
    pub fn host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    /// Set the listen port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the static files directory for serving the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            chat: self.chat,
            transcriber: self.transcriber,
            synthesizer: self.synthesizer,
            speech_stream: self.speech_stream,
            chat_defaults: self.chat_defaults,
            tts: self.tts,
        });

        ApiServer {
            state,
            host: self.host,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .nest("/v1/agent", chat::router(self.state.clone()))
            .nest("/ws", voice_ws::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        // Serve the browser UI if configured
        if let Some(static_dir) = &self.static_dir {
            if !static_dir.is_dir() {
                tracing::warn!(path = %static_dir.display(), "static directory does not exist");
            }
            let serve_dir = ServeDir::new(static_dir).append_index_html_on_directories(true);

            router = router.nest_service("/realtime", serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files at /realtime");
        }

        // CORS layer for cross-origin requests from the browser client
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([
                HeaderName::from_static(AGENT_TEXT_HEADER),
                HeaderName::from_static(TEXT_TRUNCATED_HEADER),
            ]);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(addr = %addr, "API server listening");

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

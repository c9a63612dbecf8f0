//! Agent chat endpoints: text replies and streamed audio replies

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::{StreamExt, stream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AGENT_TEXT_HEADER, ApiState, TEXT_TRUNCATED_HEADER};
use crate::chat::{ChatReply, ChatRequest, Conversation, generate_reply};
use crate::voice::{OutputFormat, TtsRequest, char_prefix, stream_tts, trim_for_tts};
use crate::Error;

/// Characters of reply text echoed in the `x-agent-text` header
pub const AGENT_TEXT_PREVIEW_CHARS: usize = 1024;

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream-audio", post(stream_audio))
        .with_state(state)
}

/// Per-request overrides for streamed synthesis
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioParams {
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub tts_model_id: Option<String>,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
}

/// Body of `POST /v1/agent/chat/stream-audio`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamAudioRequest {
    #[serde(flatten)]
    pub chat: ChatRequest,
    #[serde(flatten)]
    pub audio: AudioParams,
}

/// Reply with text
async fn chat(
    State(state): State<Arc<ApiState>>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let conversation = Conversation::from_request(request, &state.chat_defaults);
    let reply = generate_reply(state.chat.as_ref(), &conversation).await?;

    Ok(Json(reply))
}

/// Reply with audio streamed as it is synthesized
///
/// The first audio chunk is awaited before the response head is sent, so
/// a TTS stream that never starts is reported as an HTTP error.
async fn stream_audio(
    State(state): State<Arc<ApiState>>,
    ApiJson(request): ApiJson<StreamAudioRequest>,
) -> Result<Response, ApiError> {
    let source = state
        .speech_stream
        .clone()
        .ok_or_else(|| Error::Config("TTS not configured: ELEVENLABS_API_KEY is not set".to_string()))?;

    let conversation = Conversation::from_request(request.chat, &state.chat_defaults);
    let reply = generate_reply(state.chat.as_ref(), &conversation).await?;

    let (text, truncated) = trim_for_tts(&reply.reply, state.tts.max_chars);
    if truncated {
        tracing::debug!(max_chars = state.tts.max_chars, "reply trimmed before synthesis");
    }
    let agent_text = urlencoding::encode(char_prefix(&text, AGENT_TEXT_PREVIEW_CHARS)).into_owned();

    let params = request.audio;
    let tts_request = TtsRequest {
        text: text.into_owned(),
        voice_id: params.voice_id.unwrap_or_else(|| state.tts.voice_id.clone()),
        model_id: params.tts_model_id.unwrap_or_else(|| state.tts.model_id.clone()),
        output_format: params.output_format.unwrap_or(state.tts.output_format),
        retry_budget: state.tts.retries,
    };
    let format = tts_request.output_format;

    let mut audio = stream_tts(source, tts_request);
    let first = match audio.next().await {
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(e)) => return Err(e.into()),
        None => None,
    };

    let body = stream::iter(first.map(Ok::<_, Error>)).chain(audio);

    let headers = [
        (header::CONTENT_TYPE, format.media_type().to_string()),
        (HeaderName::from_static(AGENT_TEXT_HEADER), agent_text),
        (HeaderName::from_static(TEXT_TRUNCATED_HEADER), truncated.to_string()),
    ];

    Ok((headers, Body::from_stream(body)).into_response())
}

/// JSON body extractor whose rejections use the API error body
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Chat API errors
#[derive(Debug)]
pub enum ApiError {
    /// The request body could not be read as the expected JSON
    Rejected(JsonRejection),
    /// Handling failed
    Failed(Error),
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::Failed(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection)
    }
}

impl ApiError {
    /// HTTP status and machine-readable code
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        let error = match self {
            Self::Rejected(rejection) => return (rejection.status(), "bad_request"),
            Self::Failed(error) => error,
        };

        match error {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "not_configured"),
            Error::EmptyReply => (StatusCode::BAD_GATEWAY, "empty_reply"),
            Error::Llm(_) | Error::Stt(_) | Error::Speech(_) => {
                (StatusCode::BAD_GATEWAY, "provider_error")
            }
            Error::Tts(_) => (StatusCode::INTERNAL_SERVER_ERROR, "tts_failed"),
            Error::Audio(_) | Error::Protocol(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Io(_) | Error::Http(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Rejected(rejection) => rejection.body_text(),
            Self::Failed(error) => error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code) = self.status_and_code();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        } else {
            tracing::warn!(code, error = %message, "request rejected");
        }

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_audio_request_flattens_both_parts() {
        let request: StreamAudioRequest = serde_json::from_str(
            r#"{
                "messages": [{"role": "user", "content": "hi"}],
                "model": "gpt-4o",
                "voice_id": "v1",
                "output_format": "wav_44100"
            }"#,
        )
        .unwrap();

        assert_eq!(request.chat.messages.len(), 1);
        assert_eq!(request.chat.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.audio.voice_id.as_deref(), Some("v1"));
        assert!(request.audio.tts_model_id.is_none());
        assert_eq!(request.audio.output_format, Some(OutputFormat::Wav44100));
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let result = serde_json::from_str::<StreamAudioRequest>(
            r#"{"messages": [], "output_format": "flac_48000"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn error_status_mapping() {
        let cases = [
            (Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "not_configured"),
            (Error::EmptyReply, StatusCode::BAD_GATEWAY, "empty_reply"),
            (Error::Llm("x".into()), StatusCode::BAD_GATEWAY, "provider_error"),
            (Error::Tts("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "tts_failed"),
            (Error::Audio("x".into()), StatusCode::BAD_REQUEST, "bad_request"),
        ];

        for (error, status, code) in cases {
            assert_eq!(ApiError::from(error).status_and_code(), (status, code));
        }
    }
}

//! `OpenAI` provider: chat completions, Whisper transcription and reply speech

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::retry::{RetryPolicy, send_with_retry};
use super::{ChatProvider, SpeechSynthesizer, Transcriber};
use crate::chat::{Conversation, Message};
use crate::config::Config;
use crate::{Error, Result};

/// `OpenAI` API client
///
/// One instance serves all three request/response capabilities; it is
/// built once at startup and shared.
pub struct OpenAiClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    stt_model: String,
    speech_model: String,
    speech_voice: String,
    speech_format: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    /// Create a client from gateway configuration
    ///
    /// # Errors
    ///
    /// Returns error if the `OpenAI` key is missing or the HTTP client
    /// cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.require_openai_key()?.clone();
        let client = Client::builder().timeout(config.llm.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            stt_model: config.voice.stt_model.clone(),
            speech_model: config.voice.speech_model.clone(),
            speech_voice: config.voice.speech_voice.clone(),
            speech_format: config.voice.speech_format.clone(),
            retry: RetryPolicy::with_max_retries(config.llm.max_retries),
        })
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

/// Turn a non-success response into a provider error carrying status and body
async fn ensure_success(
    response: Response,
    what: &str,
    to_error: fn(String) -> Error,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "{what} API error");
    Err(to_error(format!("{what} API error {status}: {body}")))
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, conversation: &Conversation) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &conversation.model,
            messages: conversation.window(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = self.url("chat/completions");
        let response = send_with_retry(&self.retry, "openai-chat", || {
            self.client
                .post(&url)
                .header("Authorization", self.bearer())
                .json(&request)
        })
        .await
        .map_err(|e| Error::Llm(format!("OpenAI request failed: {e}")))?;

        let response = ensure_success(response, "OpenAI chat", Error::Llm).await?;

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse OpenAI response: {e}")))?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let url = self.url("audio/transcriptions");
        let response = send_with_retry(&self.retry, "openai-whisper", || {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("audio/webm"));
            let part = Part::bytes(audio.to_vec())
                .file_name("audio.webm")
                .headers(headers);
            let form = Form::new()
                .part("file", part)
                .text("model", self.stt_model.clone());

            self.client
                .post(&url)
                .header("Authorization", self.bearer())
                .multipart(form)
        })
        .await
        .map_err(|e| Error::Stt(format!("Whisper request failed: {e}")))?;

        let response = ensure_success(response, "Whisper", Error::Stt).await?;

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("Failed to parse Whisper response: {e}")))?;

        let transcript = result.text.trim().to_string();
        tracing::info!(chars = transcript.chars().count(), "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let request = SpeechRequest {
            model: &self.speech_model,
            voice: &self.speech_voice,
            input: text,
            response_format: &self.speech_format,
        };

        let url = self.url("audio/speech");
        let response = send_with_retry(&self.retry, "openai-speech", || {
            self.client
                .post(&url)
                .header("Authorization", self.bearer())
                .json(&request)
        })
        .await
        .map_err(|e| Error::Speech(format!("OpenAI speech request failed: {e}")))?;

        let response = ensure_success(response, "OpenAI speech", Error::Speech).await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Speech(format!("Failed to read speech audio: {e}")))?;

        tracing::debug!(audio_bytes = audio.len(), "reply synthesized");
        Ok(audio)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

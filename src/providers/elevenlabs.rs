//! `ElevenLabs` streaming text-to-speech

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{AudioChunkStream, SpeechStreamer};
use crate::config::Config;
use crate::voice::TtsRequest;
use crate::{Error, Result};

/// Connect timeout for opening a stream; the body itself is unbounded
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `ElevenLabs` API client
pub struct ElevenLabsClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl ElevenLabsClient {
    /// Create a client from an API key and base URL
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty or the HTTP client cannot be built
    pub fn new(api_key: SecretString, base_url: &str) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("ElevenLabs API key required".to_string()));
        }

        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from gateway configuration, if a key is configured
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        config
            .api_keys
            .elevenlabs
            .clone()
            .map(|key| Self::new(key, &config.tts.base_url))
            .transpose()
    }

    fn stream_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.base_url,
            urlencoding::encode(voice_id)
        )
    }
}

#[async_trait]
impl SpeechStreamer for ElevenLabsClient {
    async fn open_stream(&self, request: &TtsRequest) -> Result<AudioChunkStream> {
        tracing::debug!(
            voice = %request.voice_id,
            model = %request.model_id,
            format = %request.output_format,
            chars = request.text.chars().count(),
            "opening ElevenLabs stream"
        );

        let response = self
            .client
            .post(self.stream_url(&request.voice_id))
            .query(&[("output_format", request.output_format.as_str())])
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&StreamRequest {
                text: &request.text,
                model_id: &request.model_id,
            })
            .send()
            .await
            .map_err(|e| Error::Tts(format!("ElevenLabs request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "ElevenLabs API error");
            return Err(Error::Tts(format!("ElevenLabs API error {status}: {body}")));
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| Error::Tts(format!("ElevenLabs stream error: {e}")))
            .boxed())
    }
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        let result = ElevenLabsClient::new(SecretString::from(""), "https://api.elevenlabs.io");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn absent_key_yields_no_client() {
        assert!(ElevenLabsClient::from_config(&Config::default()).unwrap().is_none());
    }

    #[test]
    fn stream_url_encodes_voice() {
        let client =
            ElevenLabsClient::new(SecretString::from("xi"), "https://api.elevenlabs.io/").unwrap();

        assert_eq!(
            client.stream_url("JBFqnCBsd6RMkjVDRZzb"),
            "https://api.elevenlabs.io/v1/text-to-speech/JBFqnCBsd6RMkjVDRZzb/stream"
        );
        assert_eq!(
            client.stream_url("a b/c"),
            "https://api.elevenlabs.io/v1/text-to-speech/a%20b%2Fc/stream"
        );
    }
}

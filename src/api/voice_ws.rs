//! WebSocket voice channel
//!
//! Each inbound `{ "audio": "<base64>" }` frame is transcribed, answered
//! and spoken back as one JSON frame. Frames are handled strictly in
//! arrival order; any failure closes the channel with code 1011.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::IntoResponse,
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::ApiState;
use crate::chat::{Conversation, generate_reply};
use crate::{Error, Result};

/// Prefix of the close reason sent when processing fails
const CLOSE_REASON_PREFIX: &str = "Error in websocket: ";

/// Longest close reason body kept before the ellipsis
const CLOSE_REASON_KEEP: usize = 120;

/// Build voice channel router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/voice", get(ws_upgrade))
        .with_state(state)
}

/// Incoming frame from the browser
#[derive(Debug, Deserialize)]
struct VoiceIncoming {
    #[serde(default)]
    audio: Option<String>,
}

/// Outgoing frame to the browser
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum VoiceOutgoing {
    /// One full conversational turn
    Reply {
        user_text: String,
        assistant_text: String,
        /// Base64-encoded synthesized reply
        assistant_audio: String,
    },
    /// Nothing intelligible was said
    Status { status: &'static str },
}

impl VoiceOutgoing {
    const fn silence() -> Self {
        Self::Status {
            status: "silence_detected",
        }
    }
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let connection_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("voice_ws", %connection_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state).instrument(span))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("voice channel connected");

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(Message::Close(_)) => {
                tracing::info!("voice channel closed by client");
                return;
            }
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!(error = %e, "voice channel disconnected");
                return;
            }
        };

        let outgoing = match handle_frame(&state, frame).await {
            Ok(Some(outgoing)) => outgoing,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(error = %e, "voice turn failed, closing channel");
                let close = CloseFrame {
                    code: close_code::ERROR,
                    reason: close_reason(&e).into(),
                };
                let _ = sender.send(Message::Close(Some(close))).await;
                return;
            }
        };

        let text = match serde_json::to_string(&outgoing) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode voice reply");
                return;
            }
        };

        if sender.send(Message::Text(text.into())).await.is_err() {
            tracing::info!("voice channel disconnected before reply was sent");
            return;
        }
    }

    tracing::info!("voice channel ended");
}

/// Process one inbound frame; `None` means the frame is ignored
async fn handle_frame(state: &ApiState, frame: Message) -> Result<Option<VoiceOutgoing>> {
    let text = match frame {
        Message::Text(text) => text,
        Message::Binary(_) => {
            return Err(Error::Protocol("expected a JSON text frame".to_string()));
        }
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => return Ok(None),
    };

    let incoming: VoiceIncoming = serde_json::from_str(text.as_str())
        .map_err(|e| Error::Protocol(format!("invalid message: {e}")))?;

    // An empty recording still gets an answer; only a missing field is skipped
    let Some(audio) = incoming.audio else {
        tracing::debug!("ignoring frame without audio");
        return Ok(None);
    };

    voice_turn(state, &audio).await.map(Some)
}

/// Decode, transcribe, answer and synthesize one utterance
async fn voice_turn(state: &ApiState, audio_b64: &str) -> Result<VoiceOutgoing> {
    let audio = BASE64
        .decode(audio_b64.trim())
        .map_err(|e| Error::Audio(format!("invalid base64 audio: {e}")))?;

    let transcript = state.transcriber.transcribe(&audio).await?;
    let user_text = transcript.trim();
    if user_text.is_empty() {
        tracing::debug!(audio_bytes = audio.len(), "silence detected");
        return Ok(VoiceOutgoing::silence());
    }

    let conversation = Conversation::single_user(user_text, &state.chat_defaults);
    let reply = generate_reply(state.chat.as_ref(), &conversation).await?;
    let speech = state.synthesizer.synthesize(&reply.reply).await?;

    tracing::info!(
        user_chars = user_text.chars().count(),
        reply_chars = reply.reply.chars().count(),
        audio_bytes = speech.len(),
        "voice turn complete"
    );

    Ok(VoiceOutgoing::Reply {
        user_text: user_text.to_string(),
        assistant_text: reply.reply,
        assistant_audio: BASE64.encode(speech),
    })
}

/// Close reason for a failed channel, bounded to fit a close frame
///
/// Reasons longer than `CLOSE_REASON_KEEP + 3` bytes keep their first
/// `CLOSE_REASON_KEEP` bytes (on a char boundary) followed by `...`.
pub fn close_reason(error: &Error) -> String {
    let reason = format!("{CLOSE_REASON_PREFIX}{error}");
    if reason.len() <= CLOSE_REASON_KEEP + 3 {
        return reason;
    }

    let mut end = CLOSE_REASON_KEEP;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &reason[..end])
}

//! Chorus Gateway - Voice and chat gateway between a browser and AI providers
//!
//! This library provides the core functionality for the Chorus gateway:
//! - Chat completion with context windowing
//! - Streamed text-to-speech with a retrying relay
//! - A WebSocket voice channel (speech in, text and speech out)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Browser client                       │
//! │   /v1/agent/chat  │  /chat/stream-audio  │ /ws/voice │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Chorus Gateway                       │
//! │   Chat  │  Text trimmer  │  TTS relay  │  Voice WS   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Providers                           │
//! │   OpenAI (LLM, Whisper, speech)  │  ElevenLabs TTS  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod providers;
pub mod voice;

pub use api::{ApiServer, ApiServerBuilder, ApiState};
pub use chat::{ChatReply, ChatRequest, Conversation, Message, Role};
pub use config::Config;
pub use error::{Error, Result};
pub use voice::{OutputFormat, TtsRequest, stream_tts, trim_for_tts};

//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};

use chorus_gateway::providers::{
    AudioChunkStream, ChatProvider, SpeechStreamer, SpeechSynthesizer, Transcriber,
};
use chorus_gateway::{ApiServer, ApiServerBuilder, Conversation, Error, Result, TtsRequest};

/// Chat provider returning a fixed reply and recording what it was asked
pub struct StubChat {
    reply: std::result::Result<String, String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Conversation>>,
}

impl StubChat {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_conversation(&self) -> Option<Conversation> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for StubChat {
    async fn complete(&self, conversation: &Conversation) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(conversation.clone());
        self.reply.clone().map_err(Error::Llm)
    }
}

/// Transcriber returning scripted transcripts in order, repeating the last
pub struct StubTranscriber {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    last: Mutex<std::result::Result<String, String>>,
    calls: AtomicUsize,
}

impl StubTranscriber {
    pub fn scripted(transcripts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(transcripts.iter().map(|t| Ok((*t).to_string())).collect()),
            last: Mutex::new(Ok(String::new())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let outcome = match next {
            Some(outcome) => {
                *self.last.lock().unwrap() = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap().clone(),
        };
        outcome.map_err(Error::Stt)
    }
}

/// Synthesizer returning a fixed clip
pub struct StubSynthesizer {
    audio: Bytes,
    seen: Mutex<Vec<String>>,
}

impl StubSynthesizer {
    pub fn new(audio: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            audio: Bytes::from_static(audio),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(self.audio.clone())
    }
}

/// What one stream opening produces
pub enum Open {
    /// Opening fails
    Refuse,
    /// Stream yields these chunks, then optionally fails
    Serve(Vec<&'static [u8]>, Option<&'static str>),
}

/// Streaming TTS source following a script of open attempts
pub struct StubStreamer {
    script: Mutex<VecDeque<Open>>,
    opened: AtomicUsize,
    requests: Mutex<Vec<TtsRequest>>,
}

impl StubStreamer {
    pub fn scripted(script: Vec<Open>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            opened: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn serving(chunks: Vec<&'static [u8]>) -> Arc<Self> {
        Self::scripted(vec![Open::Serve(chunks, None)])
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<TtsRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SpeechStreamer for StubStreamer {
    async fn open_stream(&self, request: &TtsRequest) -> Result<AudioChunkStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Open::Serve(chunks, failure)) => {
                let items = chunks
                    .into_iter()
                    .map(|c| Ok(Bytes::from_static(c)))
                    .chain(failure.map(|m| Err(Error::Tts(m.to_string()))));
                Ok(stream::iter(items).boxed())
            }
            Some(Open::Refuse) | None => Err(Error::Tts("provider unavailable".to_string())),
        }
    }
}

/// Stub providers wired into an API server
pub struct TestApp {
    pub chat: Arc<StubChat>,
    pub transcriber: Arc<StubTranscriber>,
    pub synthesizer: Arc<StubSynthesizer>,
    pub streamer: Option<Arc<StubStreamer>>,
}

impl TestApp {
    pub fn new(chat: Arc<StubChat>) -> Self {
        Self {
            chat,
            transcriber: StubTranscriber::scripted(&[]),
            synthesizer: StubSynthesizer::new(b"mp3-bytes"),
            streamer: None,
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(StubChat::replying(reply))
    }

    #[must_use]
    pub fn with_streamer(mut self, streamer: Arc<StubStreamer>) -> Self {
        self.streamer = Some(streamer);
        self
    }

    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<StubTranscriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn builder(&self) -> ApiServerBuilder {
        let mut builder = ApiServerBuilder::new(
            self.chat.clone(),
            self.transcriber.clone(),
            self.synthesizer.clone(),
        );
        if let Some(streamer) = &self.streamer {
            builder = builder.speech_stream(streamer.clone());
        }
        builder
    }

    pub fn server(&self) -> ApiServer {
        self.builder().build()
    }

    pub fn router(&self) -> axum::Router {
        self.server().router()
    }
}

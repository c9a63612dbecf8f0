//! Conversation types and chat orchestration

use serde::{Deserialize, Serialize};

use crate::providers::ChatProvider;
use crate::{Error, Result};

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default number of trailing messages forwarded to the model
pub const DEFAULT_MAX_CONTEXT: usize = 12;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Build a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Chat request body as sent by the client
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Messages comprising the conversation so far
    pub messages: Vec<Message>,
    /// Model override
    #[serde(default)]
    pub model: Option<String>,
    /// Context window override
    #[serde(default)]
    pub max_context: Option<usize>,
}

/// Defaults applied to requests that leave fields out
#[derive(Debug, Clone)]
pub struct ChatDefaults {
    pub model: String,
    pub max_context: usize,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_context: DEFAULT_MAX_CONTEXT,
        }
    }
}

/// A conversation with every setting resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub model: String,
    /// Trailing messages forwarded to the model; `0` forwards everything
    pub max_context: usize,
}

impl Conversation {
    /// Resolve a client request against configured defaults
    #[must_use]
    pub fn from_request(request: ChatRequest, defaults: &ChatDefaults) -> Self {
        Self {
            messages: request.messages,
            model: request.model.unwrap_or_else(|| defaults.model.clone()),
            max_context: request.max_context.unwrap_or(defaults.max_context),
        }
    }

    /// A one-message conversation from the user
    #[must_use]
    pub fn single_user(content: impl Into<String>, defaults: &ChatDefaults) -> Self {
        Self {
            messages: vec![Message::user(content)],
            model: defaults.model.clone(),
            max_context: defaults.max_context,
        }
    }

    /// Messages inside the context window
    #[must_use]
    pub fn window(&self) -> &[Message] {
        if self.max_context == 0 || self.messages.len() <= self.max_context {
            &self.messages
        } else {
            &self.messages[self.messages.len() - self.max_context..]
        }
    }
}

/// Reply returned to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: String,
}

/// Ask the model for the next assistant turn
///
/// # Errors
///
/// Returns `Error::EmptyReply` when the model answers with only
/// whitespace, or the provider's error when the call fails.
pub async fn generate_reply(
    provider: &dyn ChatProvider,
    conversation: &Conversation,
) -> Result<ChatReply> {
    tracing::debug!(
        model = %conversation.model,
        messages = conversation.window().len(),
        "requesting chat completion"
    );

    let text = provider.complete(conversation).await?;
    let reply = text.trim();
    if reply.is_empty() {
        tracing::warn!(model = %conversation.model, "model returned an empty reply");
        return Err(Error::EmptyReply);
    }

    Ok(ChatReply {
        reply: reply.to_string(),
        model: conversation.model.clone(),
    })
}

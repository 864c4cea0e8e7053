//! Boundary to the external conversational and image backends.
//!
//! Phases never talk to a model directly. They open a [`DialogueSession`]
//! through a [`SessionFactory`] and drive it turn by turn:
//!
//! - `init` installs both parties' system prompts and returns the first user
//!   message built from the seed text
//! - `step` sends one user message and returns the assistant's answer plus the
//!   user's follow-up
//!
//! Any backend can sit behind the traits: an OpenAI-compatible HTTP endpoint
//! ([`openai`]), or a replayed transcript for tests ([`scripted`]).

pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DialogueError;

pub use openai::{OpenAiImageGenerator, OpenAiSessionFactory};
pub use scripted::ScriptedSessionFactory;

/// Marker that introduces a conclusion in a dialogue message.
pub const INFO_MARKER: &str = "<INFO>";

/// A message sent into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role_name: String,
    pub content: String,
}

/// One party's answer for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub role_name: String,
    pub content: String,
    /// The party ended the conversation
    #[serde(default)]
    pub terminated: bool,
}

impl ChatResponse {
    pub fn new(role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            content: content.into(),
            terminated: false,
        }
    }

    pub fn has_conclusion(&self) -> bool {
        self.content.contains(INFO_MARKER)
    }

    /// Continue the conversation by sending this response as the next message.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            role_name: self.role_name,
            content: self.content,
        }
    }
}

/// System prompts for the two parties of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompts {
    pub assistant_role_name: String,
    pub assistant_prompt: String,
    pub user_role_name: String,
    pub user_prompt: String,
}

/// A two-party, turn-bounded conversation.
#[async_trait]
pub trait DialogueSession: Send {
    /// Install system prompts and turn `seed` into the opening user message.
    async fn init(
        &mut self,
        prompts: &SystemPrompts,
        seed: &str,
    ) -> Result<ChatMessage, DialogueError>;

    /// Run one turn. With `reflect` set only the assistant answers and the
    /// returned user response is empty.
    async fn step(
        &mut self,
        message: &ChatMessage,
        reflect: bool,
    ) -> Result<(ChatResponse, ChatResponse), DialogueError>;
}

/// Opens sessions. `label` names what the session is for (usually the
/// phase name) and is used for logging and by test doubles.
pub trait SessionFactory: Send + Sync {
    fn open(&self, label: &str) -> Box<dyn DialogueSession>;
}

/// Turns an image description into image bytes.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns `None` when the generator declines to produce an image.
    async fn generate(
        &self,
        description: &str,
        size: &str,
    ) -> Result<Option<Vec<u8>>, DialogueError>;
}

/// Image generator that never produces anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopImageGenerator;

#[async_trait]
impl ImageGenerator for NoopImageGenerator {
    async fn generate(
        &self,
        _description: &str,
        _size: &str,
    ) -> Result<Option<Vec<u8>>, DialogueError> {
        Ok(None)
    }
}

/// Text after the last [`INFO_MARKER`], or `None` if the marker is absent.
pub fn extract_conclusion(content: &str) -> Option<&str> {
    content
        .rfind(INFO_MARKER)
        .map(|idx| content[idx + INFO_MARKER.len()..].trim())
}

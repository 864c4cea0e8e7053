//! Deterministic dialogue backend that replays canned assistant replies.
//!
//! Replies are queued per session label. Every session opened records its
//! label and the seed it was initialized with, so callers can assert the
//! order in which phases ran and what they were asked.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChatMessage, ChatResponse, DialogueSession, SessionFactory, SystemPrompts};
use crate::errors::DialogueError;

/// What the user party answers on every scripted turn.
const USER_FOLLOW_UP: &str = "Please continue.";

#[derive(Debug, Default)]
struct ScriptState {
    replies: HashMap<String, VecDeque<String>>,
    default_reply: Option<String>,
    opened: Vec<String>,
    seeds: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSessionFactory {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply used whenever a label has no queued reply left.
    pub fn with_default_reply(reply: impl Into<String>) -> Self {
        let factory = Self::new();
        factory.lock().default_reply = Some(reply.into());
        factory
    }

    /// Queue `reply` as the next assistant answer for sessions labelled `label`.
    pub fn push_reply(&self, label: &str, reply: impl Into<String>) {
        self.lock()
            .replies
            .entry(label.to_string())
            .or_default()
            .push_back(reply.into());
    }

    /// Labels of all sessions opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Seeds sessions labelled `label` were initialized with, in order.
    pub fn seeds_for(&self, label: &str) -> Vec<String> {
        self.lock()
            .seeds
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, seed)| seed.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionFactory for ScriptedSessionFactory {
    fn open(&self, label: &str) -> Box<dyn DialogueSession> {
        self.lock().opened.push(label.to_string());
        Box::new(ScriptedSession {
            label: label.to_string(),
            state: Arc::clone(&self.state),
            prompts: None,
        })
    }
}

struct ScriptedSession {
    label: String,
    state: Arc<Mutex<ScriptState>>,
    prompts: Option<SystemPrompts>,
}

#[async_trait]
impl DialogueSession for ScriptedSession {
    async fn init(
        &mut self,
        prompts: &SystemPrompts,
        seed: &str,
    ) -> Result<ChatMessage, DialogueError> {
        self.prompts = Some(prompts.clone());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.seeds.push((self.label.clone(), seed.to_string()));
        Ok(ChatMessage {
            role_name: prompts.user_role_name.clone(),
            content: seed.to_string(),
        })
    }

    async fn step(
        &mut self,
        _message: &ChatMessage,
        reflect: bool,
    ) -> Result<(ChatResponse, ChatResponse), DialogueError> {
        let prompts = self.prompts.as_ref().ok_or(DialogueError::NotInitialized)?;
        let reply = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let queued = state
                .replies
                .get_mut(&self.label)
                .and_then(|queue| queue.pop_front());
            queued.or_else(|| state.default_reply.clone())
        }
        .ok_or_else(|| DialogueError::ScriptExhausted(self.label.clone()))?;

        let assistant = ChatResponse::new(prompts.assistant_role_name.clone(), reply);
        let user = if reflect {
            ChatResponse::new(prompts.user_role_name.clone(), "")
        } else {
            ChatResponse::new(prompts.user_role_name.clone(), USER_FOLLOW_UP)
        };
        Ok((assistant, user))
    }
}

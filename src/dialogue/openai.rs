//! OpenAI-compatible chat-completions and image backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatResponse, DialogueSession, ImageGenerator, SessionFactory, SystemPrompts};
use crate::devchain_config::ModelSection;
use crate::errors::DialogueError;

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl WireMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user",
            content: content.to_string(),
        }
    }

    fn assistant(content: &str) -> Self {
        Self {
            role: "assistant",
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Connection settings shared by every session of a run.
#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl Endpoint {
    async fn complete(&self, messages: &[WireMessage]) -> Result<(String, bool), DialogueError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialogueError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(DialogueError::EmptyResponse)?;
        let stopped = choice.finish_reason.as_deref() == Some("content_filter");
        Ok((choice.message.content.unwrap_or_default(), stopped))
    }
}

/// Opens sessions against an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSessionFactory {
    endpoint: Endpoint,
}

impl OpenAiSessionFactory {
    /// Build from the `[model]` settings, reading the API key from the
    /// configured environment variable.
    pub fn from_settings(model: &ModelSection) -> Result<Self, DialogueError> {
        let api_key = std::env::var(&model.api_key_env)
            .map_err(|_| DialogueError::MissingApiKey(model.api_key_env.clone()))?;
        Ok(Self {
            endpoint: Endpoint {
                client: reqwest::Client::new(),
                base_url: model.base_url.clone(),
                model: model.name.clone(),
                api_key,
                temperature: model.temperature,
            },
        })
    }
}

impl SessionFactory for OpenAiSessionFactory {
    fn open(&self, label: &str) -> Box<dyn DialogueSession> {
        debug!(session = label, model = %self.endpoint.model, "Opening dialogue session");
        Box::new(OpenAiSession {
            endpoint: self.endpoint.clone(),
            prompts: None,
            assistant_history: Vec::new(),
            user_history: Vec::new(),
        })
    }
}

/// Two chat agents, each with its own history, talking through one endpoint.
struct OpenAiSession {
    endpoint: Endpoint,
    prompts: Option<SystemPrompts>,
    assistant_history: Vec<WireMessage>,
    user_history: Vec<WireMessage>,
}

#[async_trait]
impl DialogueSession for OpenAiSession {
    async fn init(
        &mut self,
        prompts: &SystemPrompts,
        seed: &str,
    ) -> Result<ChatMessage, DialogueError> {
        self.assistant_history = vec![WireMessage::system(&prompts.assistant_prompt)];
        self.user_history = vec![WireMessage::system(&prompts.user_prompt)];
        self.prompts = Some(prompts.clone());
        Ok(ChatMessage {
            role_name: prompts.user_role_name.clone(),
            content: seed.to_string(),
        })
    }

    async fn step(
        &mut self,
        message: &ChatMessage,
        reflect: bool,
    ) -> Result<(ChatResponse, ChatResponse), DialogueError> {
        let prompts = self.prompts.clone().ok_or(DialogueError::NotInitialized)?;

        self.assistant_history.push(WireMessage::user(&message.content));
        let (assistant_text, assistant_stopped) =
            self.endpoint.complete(&self.assistant_history).await?;
        self.assistant_history
            .push(WireMessage::assistant(&assistant_text));

        let assistant = ChatResponse {
            role_name: prompts.assistant_role_name.clone(),
            content: assistant_text.clone(),
            terminated: assistant_stopped,
        };

        if reflect {
            return Ok((assistant, ChatResponse::new(prompts.user_role_name, "")));
        }

        self.user_history.push(WireMessage::user(&assistant_text));
        let (user_text, user_stopped) = self.endpoint.complete(&self.user_history).await?;
        self.user_history.push(WireMessage::assistant(&user_text));

        let user = ChatResponse {
            role_name: prompts.user_role_name,
            content: user_text,
            terminated: user_stopped,
        };
        Ok((assistant, user))
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: String,
}

/// Generates images through `/images/generations` and downloads the result.
#[derive(Debug, Clone)]
pub struct OpenAiImageGenerator {
    endpoint: Endpoint,
}

impl OpenAiImageGenerator {
    pub fn from_settings(model: &ModelSection) -> Result<Self, DialogueError> {
        let factory = OpenAiSessionFactory::from_settings(model)?;
        Ok(Self {
            endpoint: factory.endpoint,
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(
        &self,
        description: &str,
        size: &str,
    ) -> Result<Option<Vec<u8>>, DialogueError> {
        let url = format!(
            "{}/images/generations",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let response = self
            .endpoint
            .client
            .post(&url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&ImageRequest {
                prompt: description,
                n: 1,
                size,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialogueError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ImageResponse = response.json().await?;
        let Some(image) = parsed.data.into_iter().next() else {
            return Ok(None);
        };
        let bytes = self.endpoint.client.get(&image.url).send().await?.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }
}

use crate::error::Result;
use crate::message::Role;
use crate::prompt::Prompt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Which wire format a prompt speaks. Chosen when the prompt is created and
/// fixed for its lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub request_tokens: u32,
    pub response_tokens: u32,
}

/// A complete, non-streamed response decoded into provider-neutral form.
#[derive(Debug, Clone)]
pub struct Completion {
    pub created: i64,
    pub model: String,
    pub usage: Usage,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone)]
pub struct Choice {
    pub index: usize,
    pub role: Role,
    pub content: String,
    pub finish_reason: Option<String>,
}

/// One streamed fragment decoded into provider-neutral form.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub created: Option<i64>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone)]
pub struct ChunkChoice {
    pub index: usize,
    pub role: Option<Role>,
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

/// Raw response fragments in emission order. Finite and not restartable.
pub type ResponseStream = BoxStream<'static, Result<String>>;

/// The chat API client the assistant drives. Implementations provide both
/// blocking and streaming retrieval of raw response payloads.
#[async_trait::async_trait]
pub trait Chat: Send + Sync {
    fn config(&self) -> &ChatConfig;

    fn provider(&self) -> ProviderKind;

    /// Create an empty prompt bound to this client's provider and model.
    fn init_prompt(&self, user_name: &str, user_email: &str) -> Prompt {
        Prompt::new(
            self.provider(),
            self.config().model.clone(),
            user_name,
            user_email,
        )
    }

    /// Send the prompt and return the full JSON response payload.
    async fn complete_response(&self, prompt: &Prompt) -> Result<String>;

    /// Send the prompt and return its JSON response fragments as they arrive.
    async fn stream_response(&self, prompt: &Prompt) -> Result<ResponseStream>;
}

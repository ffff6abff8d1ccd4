use crate::error::{DevchatError, Result};
use crate::llm::traits::*;
use crate::message::{MessageType, Role};
use crate::prompt::Prompt;
use futures::channel::mpsc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    config: ChatConfig,
}

impl OpenAIChat {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            config,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, prompt: &Prompt, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: self.config.model.clone(),
            messages: render_messages(prompt),
            stream,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn send(&self, prompt: &Prompt, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(prompt, stream);
        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            stream,
            "sending chat completion request"
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DevchatError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, text
            )));
        }
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    created: i64,
    model: String,
    usage: Option<OpenAIUsage>,
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    index: usize,
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    role: Role,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAIUsage> for Usage {
    fn from(u: OpenAIUsage) -> Self {
        Usage {
            request_tokens: u.prompt_tokens,
            response_tokens: u.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    created: Option<i64>,
    model: Option<String>,
    usage: Option<OpenAIUsage>,
    #[serde(default)]
    choices: Vec<OpenAIChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunkChoice {
    index: usize,
    #[serde(default)]
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    role: Option<Role>,
    content: Option<String>,
}

/// Outbound messages in chat-completions form. Context is fenced in
/// `<context>` tags so the model can tell it apart from instructions.
pub fn render_messages(prompt: &Prompt) -> Vec<Value> {
    prompt
        .messages()
        .into_iter()
        .map(|m| {
            let content = if m.message_type == MessageType::Context {
                format!("<context>\n{}\n</context>", m.content)
            } else {
                m.content.clone()
            };
            serde_json::json!({
                "role": m.role,
                "content": content,
            })
        })
        .collect()
}

pub fn parse_completion(blob: &str) -> Result<Completion> {
    let response: OpenAIResponse = serde_json::from_str(blob)
        .map_err(|e| DevchatError::malformed(format!("chat completion: {e}")))?;

    let usage = response
        .usage
        .ok_or_else(|| DevchatError::malformed("chat completion has no token usage"))?;

    Ok(Completion {
        created: response.created,
        model: response.model,
        usage: usage.into(),
        choices: response
            .choices
            .into_iter()
            .map(|c| Choice {
                index: c.index,
                role: c.message.role,
                content: c.message.content.unwrap_or_default(),
                finish_reason: c.finish_reason,
            })
            .collect(),
    })
}

pub fn parse_chunk(blob: &str) -> Result<Chunk> {
    let chunk: OpenAIChunk = serde_json::from_str(blob)
        .map_err(|e| DevchatError::malformed(format!("chat completion chunk: {e}")))?;

    Ok(Chunk {
        created: chunk.created,
        model: chunk.model,
        usage: chunk.usage.map(Usage::from),
        choices: chunk
            .choices
            .into_iter()
            .map(|c| ChunkChoice {
                index: c.index,
                role: c.delta.role,
                content: c.delta.content,
                finish_reason: c.finish_reason,
            })
            .collect(),
    })
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine<'a> {
    Data(&'a str),
    Done,
}

fn parse_sse_line(line: &str) -> Option<SseLine<'_>> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        Some(SseLine::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseLine::Data(data))
    }
}

/// Raw stream bytes waiting to be split into lines. Decoding happens per
/// complete line so a multi-byte character split across reads stays intact.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line including its `\n`, if one has arrived.
    fn next_line(&mut self) -> Option<Result<String>> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(decode_line(line))
    }

    /// Whatever trails the last newline once the stream has ended.
    fn finish(self) -> Option<Result<String>> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(decode_line(self.bytes))
        }
    }
}

fn decode_line(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| DevchatError::malformed(format!("stream line is not valid UTF-8: {}", e)))
}

/// Send one decoded line on to the consumer. Returns false once the stream
/// should stop: end marker, decode error or a dropped receiver.
fn forward_line(tx: &mpsc::UnboundedSender<Result<String>>, line: Result<String>) -> bool {
    let line = match line {
        Ok(line) => line,
        Err(e) => {
            // A closed receiver has nobody left to report to.
            let _ = tx.unbounded_send(Err(e));
            return false;
        }
    };
    match parse_sse_line(&line) {
        Some(SseLine::Data(data)) => tx.unbounded_send(Ok(data.to_string())).is_ok(),
        Some(SseLine::Done) => false,
        None => true,
    }
}

#[async_trait::async_trait]
impl Chat for OpenAIChat {
    fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn complete_response(&self, prompt: &Prompt) -> Result<String> {
        let response = self.send(prompt, false).await?;
        Ok(response.text().await?)
    }

    async fn stream_response(&self, prompt: &Prompt) -> Result<ResponseStream> {
        let response = self.send(prompt, true).await?;
        let (tx, rx) = mpsc::unbounded();

        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut lines = LineBuffer::default();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        // A closed receiver has nobody left to report to.
                        let _ = tx.unbounded_send(Err(DevchatError::Http(e)));
                        return;
                    }
                };

                lines.push(&chunk);
                while let Some(line) = lines.next_line() {
                    if !forward_line(&tx, line) {
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                forward_line(&tx, line);
            }
        });

        Ok(rx.boxed())
    }
}

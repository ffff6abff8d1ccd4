//! One conversational turn: the outbound messages sent to the chat API and
//! the response variants that came back, each identified by a content hash.

use crate::error::{DevchatError, Result};
use crate::llm::{openai, Chunk, Completion, ProviderKind};
use crate::message::{Message, MessageType};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// Hex SHA-1 digest of a response body. This is the durable identity of a
/// prompt's response variant.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha1::digest(content.as_bytes()))
}

/// Render a unix timestamp in the local zone, e.g. `Wed Mar 01 13:43:40 2023 +0800`.
pub fn format_local_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%a %b %d %H:%M:%S %Y %z").to_string(),
        None => timestamp.to_string(),
    }
}

/// Summary of one response variant of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortlogEntry {
    pub user: String,
    pub date: i64,
    pub last_message: String,
    pub response: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    provider: ProviderKind,
    model: String,
    user_name: String,
    user_email: String,
    timestamp: Option<i64>,
    #[serde(default)]
    instructions: Vec<Message>,
    #[serde(default)]
    history_context: Vec<Message>,
    #[serde(default)]
    history_records: Vec<Message>,
    request: Option<Message>,
    #[serde(default)]
    context: Vec<Message>,
    #[serde(default)]
    responses: BTreeMap<usize, Message>,
    #[serde(default)]
    finish_reasons: BTreeMap<usize, String>,
    request_tokens: Option<u32>,
    response_tokens: Option<u32>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    references: Vec<String>,
}

impl Prompt {
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        user_name: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            user_name: user_name.into(),
            user_email: user_email.into(),
            timestamp: None,
            instructions: Vec::new(),
            history_context: Vec::new(),
            history_records: Vec::new(),
            request: None,
            context: Vec::new(),
            responses: BTreeMap::new(),
            finish_reasons: BTreeMap::new(),
            request_tokens: None,
            response_tokens: None,
            parents: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn request_tokens(&self) -> Option<u32> {
        self.request_tokens
    }

    pub fn response_tokens(&self) -> Option<u32> {
        self.response_tokens
    }

    pub fn request(&self) -> Option<&Message> {
        self.request.as_ref()
    }

    pub fn instructions(&self) -> &[Message] {
        &self.instructions
    }

    /// Context attached to this turn, excluding folded-in history.
    pub fn context_messages(&self) -> &[Message] {
        &self.context
    }

    pub fn responses(&self) -> &BTreeMap<usize, Message> {
        &self.responses
    }

    pub fn finish_reason(&self, index: usize) -> Option<&str> {
        self.finish_reasons.get(&index).map(String::as_str)
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn set_parents(&mut self, parents: Vec<String>) {
        self.parents = parents;
    }

    pub fn set_references(&mut self, references: Vec<String>) {
        self.references = references;
    }

    /// Outbound messages in request order: instructions, history context,
    /// history records, the request, then this turn's context.
    pub fn messages(&self) -> Vec<&Message> {
        self.instructions
            .iter()
            .chain(&self.history_context)
            .chain(&self.history_records)
            .chain(self.request.as_ref())
            .chain(&self.context)
            .collect()
    }

    pub fn set_request(&mut self, content: impl Into<String>) {
        self.request = Some(Message::request(content));
    }

    /// Add an outbound message, routed by its type.
    pub fn append_message(&mut self, message: Message) -> Result<()> {
        match message.message_type {
            MessageType::Instruct => self.instructions.push(message),
            MessageType::Context => self.context.push(message),
            MessageType::Request => self.request = Some(message),
            MessageType::Record => self.history_records.push(message),
            MessageType::Response => {
                return Err(DevchatError::validation(
                    "responses are set from the chat API, not appended as outbound messages",
                ))
            }
        }
        Ok(())
    }

    /// Fold a message from an earlier prompt into this prompt's history.
    ///
    /// History is prepended within its category, so folding a response and
    /// then its request leaves the request first, and prompts folded later
    /// (older ancestors) end up ahead of those folded earlier.
    pub fn append_history(&mut self, message: Message) -> Result<()> {
        match message.message_type {
            MessageType::Context => self.history_context.insert(0, message),
            MessageType::Record | MessageType::Request | MessageType::Response => {
                self.history_records.insert(0, message.as_record())
            }
            MessageType::Instruct => {
                return Err(DevchatError::validation(
                    "instructions cannot be folded in as history",
                ))
            }
        }
        Ok(())
    }

    /// Number of folded-in history messages.
    pub fn history_len(&self) -> usize {
        self.history_context.len() + self.history_records.len()
    }

    /// Apply one complete, non-streamed response payload.
    pub fn set_response(&mut self, blob: &str) -> Result<()> {
        if !self.responses.is_empty() || self.request_tokens.is_some() {
            return Err(DevchatError::validation("prompt already has a response"));
        }

        let completion = match self.provider {
            ProviderKind::OpenAI => openai::parse_completion(blob)?,
        };

        if !completion.model.starts_with(&self.model) {
            return Err(DevchatError::validation(format!(
                "Model mismatch: expected {}, got {}",
                self.model, completion.model
            )));
        }

        let Completion {
            created,
            usage,
            mut choices,
            ..
        } = completion;

        choices.sort_by_key(|c| c.index);
        for (position, choice) in choices.iter().enumerate() {
            if choice.index != position {
                return Err(DevchatError::malformed(format!(
                    "response indices are not dense: expected {}, got {}",
                    position, choice.index
                )));
            }
        }

        for choice in choices {
            let message = Message::new(MessageType::Response, choice.role, choice.content);
            if let Some(reason) = choice.finish_reason {
                self.finish_reasons.insert(choice.index, reason);
            }
            self.responses.insert(choice.index, message);
        }
        self.timestamp = Some(created);
        self.request_tokens = Some(usage.request_tokens);
        self.response_tokens = Some(usage.response_tokens);

        tracing::debug!(
            responses = self.responses.len(),
            request_tokens = usage.request_tokens,
            response_tokens = usage.response_tokens,
            "response set"
        );
        Ok(())
    }

    /// Apply one streamed fragment.
    ///
    /// Returns the text appended to response 0, `Some("")` when this
    /// fragment carried nothing for it, or `None` once the fragment marks
    /// response 0 (or the whole stream) as finished.
    pub fn append_response(&mut self, blob: &str) -> Result<Option<String>> {
        let chunk = match self.provider {
            ProviderKind::OpenAI => openai::parse_chunk(blob)?,
        };

        if let Some(choice) = chunk
            .choices
            .iter()
            .find(|c| self.finish_reasons.contains_key(&c.index))
        {
            return Err(DevchatError::validation(format!(
                "response {} is already complete",
                choice.index
            )));
        }

        let Chunk {
            created,
            usage,
            choices,
            ..
        } = chunk;

        if self.timestamp.is_none() {
            self.timestamp = created;
        }
        if let Some(usage) = usage {
            if self.request_tokens.is_none() {
                self.request_tokens = Some(usage.request_tokens);
                self.response_tokens = Some(usage.response_tokens);
            }
        }

        if choices.is_empty() {
            return Ok(None);
        }

        let mut delta = Some(String::new());
        for choice in choices {
            let response = self
                .responses
                .entry(choice.index)
                .or_insert_with(|| Message::response(""));
            if let Some(role) = choice.role {
                response.role = role;
            }
            let text = choice.content.unwrap_or_default();
            response.content.push_str(&text);

            let finished = choice.finish_reason.is_some();
            if let Some(reason) = choice.finish_reason {
                self.finish_reasons.insert(choice.index, reason);
            }

            if choice.index == 0 {
                delta = if finished && text.is_empty() {
                    None
                } else {
                    Some(text)
                };
            }
        }
        Ok(delta)
    }

    pub fn formatted_header(&self) -> Result<String> {
        let timestamp = self
            .timestamp
            .ok_or_else(|| DevchatError::validation("prompt has no response timestamp"))?;

        Ok(format!(
            "User: {} <{}>\nDate: {}\n\n",
            self.user_name,
            self.user_email,
            format_local_time(timestamp)
        ))
    }

    pub fn formatted_response(&self, index: usize) -> Result<String> {
        let response = self.response_at(index)?;
        let mut formatted = self.formatted_header()?;
        formatted.push_str(response.content.trim());
        formatted.push_str("\n\n");
        formatted.push_str(&format!("prompt {}", content_hash(&response.content)));
        Ok(formatted)
    }

    pub fn hash(&self, index: usize) -> Result<String> {
        Ok(content_hash(&self.response_at(index)?.content))
    }

    /// Hashes of every non-empty response, by index.
    pub fn hashes(&self) -> BTreeMap<usize, String> {
        self.responses
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(i, m)| (*i, content_hash(&m.content)))
            .collect()
    }

    pub fn shortlog(&self) -> Result<Vec<ShortlogEntry>> {
        let last_message = self
            .messages()
            .last()
            .map(|m| m.content.clone())
            .ok_or_else(|| DevchatError::validation("Prompt is incomplete."))?;
        if self.responses.is_empty() {
            return Err(DevchatError::validation("Prompt is incomplete."));
        }
        let date = self
            .timestamp
            .ok_or_else(|| DevchatError::validation("Prompt is incomplete."))?;

        self.responses
            .keys()
            .map(|&index| {
                Ok(ShortlogEntry {
                    user: format!("{} <{}>", self.user_name, self.user_email),
                    date,
                    last_message: last_message.clone(),
                    response: self.responses[&index].content.clone(),
                    hash: self.hash(index)?,
                })
            })
            .collect()
    }

    fn response_at(&self, index: usize) -> Result<&Message> {
        match self.responses.get(&index) {
            Some(response) if !response.is_empty() => Ok(response),
            _ => Err(DevchatError::validation(format!(
                "Response {} is incomplete.",
                index
            ))),
        }
    }
}

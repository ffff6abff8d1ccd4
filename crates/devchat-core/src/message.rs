use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// The category a message plays within a prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Instruct,
    Context,
    /// A request or response folded in from an earlier prompt.
    Record,
    Request,
    Response,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(message_type: MessageType, role: Role, content: impl Into<String>) -> Self {
        Self {
            message_type,
            role,
            content: content.into(),
        }
    }

    pub fn instruct(content: impl Into<String>) -> Self {
        Self::new(MessageType::Instruct, Role::System, content)
    }

    pub fn context(content: impl Into<String>) -> Self {
        Self::new(MessageType::Context, Role::System, content)
    }

    pub fn request(content: impl Into<String>) -> Self {
        Self::new(MessageType::Request, Role::User, content)
    }

    pub fn response(content: impl Into<String>) -> Self {
        Self::new(MessageType::Response, Role::Assistant, content)
    }

    /// Re-tag a message from another prompt as a history record, keeping its role.
    pub fn as_record(&self) -> Self {
        Self::new(MessageType::Record, self.role, self.content.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

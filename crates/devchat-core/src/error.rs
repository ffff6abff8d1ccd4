use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevchatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Prompt not found: {0}")]
    NotFound(String),

    #[error("Ambiguous hash prefix {prefix}: matches {}", .matches.join(", "))]
    AmbiguousHash { prefix: String, matches: Vec<String> },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DevchatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// True for lookup failures, including ambiguous prefixes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AmbiguousHash { .. })
    }
}

pub type Result<T> = std::result::Result<T, DevchatError>;

pub mod error;
pub mod message;
pub mod prompt;
pub mod llm;
pub mod store;
pub mod assistant;
pub mod config;
pub mod git;

// Re-export key types
pub use error::{DevchatError, Result};
pub use message::{Message, MessageType, Role};
pub use prompt::{content_hash, Prompt, ShortlogEntry};
pub use llm::{Chat, ChatConfig, OpenAIChat, ProviderKind, ResponseStream};
pub use store::{parse_hashes, FileStore, MemoryStore, Store};
pub use assistant::{Assistant, ResponseIter, Turn, DEFAULT_MESSAGE_LIMIT};
pub use config::Settings;
pub use git::GitIdentity;

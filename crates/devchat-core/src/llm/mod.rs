mod traits;
pub mod openai;

pub use traits::*;
pub use openai::OpenAIChat;

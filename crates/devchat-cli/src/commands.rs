use clap::{Args, Parser, Subcommand};
use devchat_core::Settings;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devchat")]
#[command(about = "DevChat - conversations with a chat model, kept as content-hashed prompts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a request to the chat model
    Prompt(PromptArgs),
    /// Show the shortlog of stored prompts
    Log(LogArgs),
}

#[derive(Args, Debug)]
pub struct PromptArgs {
    /// The request to send
    pub request: String,

    /// File whose content is added as an instruction (repeatable)
    #[arg(short, long, value_name = "FILE")]
    pub instruct: Vec<PathBuf>,

    /// File whose content is added as context (repeatable)
    #[arg(short, long, value_name = "FILE")]
    pub context: Vec<PathBuf>,

    /// Hash (or prefix) of a prompt this one continues from
    #[arg(short, long, value_name = "HASH")]
    pub parent: Vec<String>,

    /// Hash (or prefix) of a prompt to cite as a reference
    #[arg(short, long, value_name = "HASH")]
    pub reference: Vec<String>,

    /// Chat model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Wait for the whole response instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Maximum number of history messages folded into the prompt
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

impl PromptArgs {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(ref model) = self.model {
            settings.chat.model = model.clone();
        }
        if self.no_stream {
            settings.chat.stream = false;
        }
        if let Some(limit) = self.limit {
            settings.history.message_limit = limit;
        }
    }
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Hash (or prefix) of the prompt to show; omit to list recent prompts
    pub hash: Option<String>,

    /// How many recent prompts to list
    #[arg(short = 'n', long, default_value_t = 5)]
    pub max_count: usize,
}

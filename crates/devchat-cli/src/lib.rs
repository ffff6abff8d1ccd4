// Library interface for devchat-cli
// This allows integration tests to drive commands without a terminal.

pub mod app;
pub mod commands;

pub use commands::{Cli, Command, LogArgs, PromptArgs};

use clap::Parser;
use devchat_cli::app::{converse, resolve_identity, write_log};
use devchat_cli::{Cli, Command, LogArgs, PromptArgs};
use devchat_core::*;
use futures::StreamExt;
use std::sync::Arc;
use tempfile::TempDir;

// ========================================================================
// Argument parsing (commands.rs)
// ========================================================================

fn parse_prompt(args: &[&str]) -> PromptArgs {
    match Cli::try_parse_from(args).unwrap().command {
        Command::Prompt(args) => args,
        other => panic!("expected prompt command, got {other:?}"),
    }
}

#[test]
fn test_prompt_command_minimal() {
    let args = parse_prompt(&["devchat", "prompt", "What day is it tomorrow?"]);
    assert_eq!(args.request, "What day is it tomorrow?");
    assert!(args.instruct.is_empty());
    assert!(args.parent.is_empty());
    assert!(!args.no_stream);
    assert!(args.model.is_none());
}

#[test]
fn test_prompt_command_repeatable_flags() {
    let args = parse_prompt(&[
        "devchat", "prompt", "-i", "a.md", "-i", "b.md", "-c", "ctx.txt", "-p", "abc123", "-r",
        "def456", "-r", "789", "hello",
    ]);
    assert_eq!(args.instruct.len(), 2);
    assert_eq!(args.context.len(), 1);
    assert_eq!(args.parent, vec!["abc123"]);
    assert_eq!(args.reference, vec!["def456", "789"]);
    assert_eq!(args.request, "hello");
}

#[test]
fn test_prompt_args_override_settings() {
    let args = parse_prompt(&[
        "devchat", "prompt", "--model", "gpt-4", "--no-stream", "--limit", "3", "hi",
    ]);
    let mut settings = Settings::default();
    args.apply(&mut settings);

    assert_eq!(settings.chat.model, "gpt-4");
    assert!(!settings.chat.stream);
    assert_eq!(settings.history.message_limit, 3);
}

#[test]
fn test_prompt_args_leave_settings_alone_by_default() {
    let args = parse_prompt(&["devchat", "prompt", "hi"]);
    let mut settings = Settings::default();
    args.apply(&mut settings);

    assert_eq!(settings.chat.model, "gpt-3.5-turbo");
    assert!(settings.chat.stream);
    assert_eq!(settings.history.message_limit, 10);
}

#[test]
fn test_log_command_defaults() {
    let cli = Cli::try_parse_from(["devchat", "log"]).unwrap();
    match cli.command {
        Command::Log(args) => {
            assert!(args.hash.is_none());
            assert_eq!(args.max_count, 5);
        }
        other => panic!("expected log command, got {other:?}"),
    }
}

#[test]
fn test_prompt_command_requires_request() {
    assert!(Cli::try_parse_from(["devchat", "prompt"]).is_err());
}

// ========================================================================
// Running a turn (app.rs)
// ========================================================================

/// Chat that answers every request with one fixed streamed reply.
struct EchoChat {
    config: ChatConfig,
    reply: String,
}

#[async_trait::async_trait]
impl Chat for EchoChat {
    fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn complete_response(&self, _prompt: &Prompt) -> Result<String> {
        Ok(serde_json::json!({
            "created": 1677649420,
            "model": self.config.model,
            "usage": {"prompt_tokens": 1, "completion_tokens": 1},
            "choices": [{"index": 0, "message": {"role": "assistant", "content": self.reply}, "finish_reason": "stop"}]
        })
        .to_string())
    }

    async fn stream_response(&self, _prompt: &Prompt) -> Result<ResponseStream> {
        let fragments: Vec<Result<String>> = vec![
            Ok(serde_json::json!({
                "created": 1677649420,
                "model": self.config.model,
                "choices": [{"index": 0, "delta": {"content": self.reply}, "finish_reason": null}]
            })
            .to_string()),
            Ok(serde_json::json!({
                "created": 1677649420,
                "model": self.config.model,
                "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
            })
            .to_string()),
        ];
        Ok(futures::stream::iter(fragments).boxed())
    }
}

fn assistant(store: Arc<MemoryStore>, stream: bool, reply: &str) -> Assistant {
    let chat = EchoChat {
        config: ChatConfig::new("gpt-3.5-turbo").with_stream(stream),
        reply: reply.to_string(),
    };
    Assistant::new(Box::new(chat), store, GitIdentity::new("Ada", "ada@example.com"))
}

#[tokio::test]
async fn test_converse_streaming_writes_deltas_and_hash() {
    let store = Arc::new(MemoryStore::new());
    let assistant = assistant(store.clone(), true, "Tomorrow.");
    let args = parse_prompt(&["devchat", "prompt", "What day is it tomorrow?"]);

    let mut out = Vec::new();
    converse(&assistant, &args, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        format!("Tomorrow.\n\nprompt {}\n", content_hash("Tomorrow."))
    );
    assert!(store.get_prompt(&content_hash("Tomorrow.")).is_ok());
}

#[tokio::test]
async fn test_converse_reads_instruction_and_context_files() {
    let temp_dir = TempDir::new().unwrap();
    let instruct = temp_dir.path().join("instruct.md");
    let context = temp_dir.path().join("context.txt");
    std::fs::write(&instruct, "Be brief.").unwrap();
    std::fs::write(&context, "It is Monday.").unwrap();

    let store = Arc::new(MemoryStore::new());
    let assistant = assistant(store.clone(), false, "Tuesday.");
    let args = parse_prompt(&[
        "devchat",
        "prompt",
        "-i",
        instruct.to_str().unwrap(),
        "-c",
        context.to_str().unwrap(),
        "Tomorrow?",
    ]);

    let mut out = Vec::new();
    converse(&assistant, &args, &mut out).await.unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("User: Ada <ada@example.com>\n"));
    assert!(text.ends_with(&format!("Tuesday.\n\nprompt {}\n", content_hash("Tuesday."))));

    let stored = store.get_prompt(&content_hash("Tuesday.")).unwrap();
    assert_eq!(stored.instructions()[0].content, "Be brief.");
    assert_eq!(stored.context_messages()[0].content, "It is Monday.");
}

#[tokio::test]
async fn test_converse_missing_file_fails_before_sending() {
    let store = Arc::new(MemoryStore::new());
    let assistant = assistant(store.clone(), false, "x");
    let args = parse_prompt(&["devchat", "prompt", "-c", "/nonexistent/devchat.txt", "hi"]);

    let mut out = Vec::new();
    assert!(converse(&assistant, &args, &mut out).await.is_err());
    assert!(out.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_converse_unknown_parent_fails() {
    let store = Arc::new(MemoryStore::new());
    let assistant = assistant(store.clone(), false, "x");
    let args = parse_prompt(&["devchat", "prompt", "-p", "abcdef", "hi"]);

    let mut out = Vec::new();
    let err = converse(&assistant, &args, &mut out).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_write_log_single_and_recent() {
    let store = Arc::new(MemoryStore::new());
    let first = assistant(store.clone(), false, "Monday.");
    let args = parse_prompt(&["devchat", "prompt", "Today?"]);
    converse(&first, &args, &mut Vec::new()).await.unwrap();

    let hash = content_hash("Monday.");
    let mut out = Vec::new();
    write_log(
        store.as_ref(),
        &LogArgs {
            hash: Some(hash[..7].to_string()),
            max_count: 5,
        },
        &mut out,
    )
    .unwrap();
    let entries: Vec<ShortlogEntry> = serde_json::from_slice(&out).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].hash, hash);
    assert_eq!(entries[0].last_message, "Today?");
    assert_eq!(entries[0].response, "Monday.");

    let mut out = Vec::new();
    write_log(
        store.as_ref(),
        &LogArgs {
            hash: None,
            max_count: 5,
        },
        &mut out,
    )
    .unwrap();
    let entries: Vec<ShortlogEntry> = serde_json::from_slice(&out).unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_resolve_identity_prefers_settings() {
    let mut settings = Settings::default();
    settings.user.name = Some("Grace".to_string());
    settings.user.email = Some("grace@example.com".to_string());

    let identity = resolve_identity(&settings).await;
    assert_eq!(identity, GitIdentity::new("Grace", "grace@example.com"));
}

use anyhow::{Context, Result};
use devchat_core::{Assistant, GitIdentity, Settings, ShortlogEntry, Store};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::commands::{LogArgs, PromptArgs};

/// Identity from settings when configured, otherwise from git.
pub async fn resolve_identity(settings: &Settings) -> GitIdentity {
    if let (Some(name), Some(email)) = (&settings.user.name, &settings.user.email) {
        return GitIdentity::new(name, email);
    }
    let detected = GitIdentity::detect().await;
    tracing::debug!(name = %detected.name, email = %detected.email, "using git identity");
    GitIdentity {
        name: settings.user.name.clone().unwrap_or(detected.name),
        email: settings.user.email.clone().unwrap_or(detected.email),
    }
}

pub fn build_assistant(settings: &Settings, user: GitIdentity) -> Result<Assistant> {
    let store = settings
        .build_store()
        .context("Failed to open prompt store")?;
    tracing::debug!(path = %store.base_dir().display(), "opened prompt store");
    let store: Arc<dyn Store> = Arc::new(store);
    Ok(
        Assistant::new(Box::new(settings.build_chat()), store, user)
            .with_message_limit(settings.history.message_limit),
    )
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|p| {
            std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))
        })
        .collect()
}

pub async fn run_prompt(settings: &Settings, args: &PromptArgs) -> Result<()> {
    let user = resolve_identity(settings).await;
    let assistant = build_assistant(settings, user)?;
    let mut stdout = std::io::stdout();
    converse(&assistant, args, &mut stdout).await
}

/// Run one turn and write its output as it arrives.
pub async fn converse<W: Write>(
    assistant: &Assistant,
    args: &PromptArgs,
    out: &mut W,
) -> Result<()> {
    let instruct = read_files(&args.instruct)?;
    let context = read_files(&args.context)?;

    let mut turn = assistant.make_prompt(
        &args.request,
        &instruct,
        &context,
        &args.parent,
        &args.reference,
    )?;
    assistant.fold_lineage(&mut turn)?;
    tracing::debug!(
        history = turn.history_count(),
        parents = args.parent.len(),
        references = args.reference.len(),
        "prompt assembled"
    );

    let mut responses = assistant.iterate_response(turn);
    while let Some(chunk) = responses.next().await {
        write!(out, "{}", chunk?)?;
        out.flush()?;
    }
    Ok(())
}

pub fn run_log(settings: &Settings, args: &LogArgs) -> Result<()> {
    let store = settings.build_store().context("Failed to open prompt store")?;
    let mut stdout = std::io::stdout();
    write_log(&store, args, &mut stdout)
}

/// Write shortlog entries as pretty JSON: one prompt by hash, or the most
/// recent prompts.
pub fn write_log<W: Write>(store: &dyn Store, args: &LogArgs, out: &mut W) -> Result<()> {
    let entries: Vec<ShortlogEntry> = match args.hash {
        Some(ref prefix) => {
            let hash = store.resolve_hash(prefix)?;
            store.get_prompt(&hash)?.shortlog()?
        }
        None => {
            let mut entries = Vec::new();
            for prompt in store.list_recent(args.max_count)? {
                entries.extend(prompt.shortlog()?);
            }
            entries
        }
    };

    writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
    Ok(())
}

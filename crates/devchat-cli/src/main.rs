use anyhow::Result;
use clap::Parser;
use devchat_cli::{app, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = devchat_core::Settings::load();

    match cli.command {
        Command::Prompt(args) => {
            args.apply(&mut settings);
            app::run_prompt(&settings, &args).await?;
        }
        Command::Log(args) => app::run_log(&settings, &args)?,
    }

    Ok(())
}

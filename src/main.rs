use anyhow::Result;
use clap::{CommandFactory, Parser};
use scribe::app::{run_config, run_history, run_transcribe, run_url};
use scribe::cli::{Cli, Commands};
use scribe::config::Config;
use scribe::logging;
use scribe::output;
use std::io::IsTerminal;
use std::path::Path;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);
    tracing::debug!(version = %scribe::version_string(), "scribe starting");

    if let Err(e) = run(cli).await {
        let color = std::io::stderr().is_terminal();
        eprintln!("{}", output::error_line(&format!("{e:#}"), color));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Transcribe(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_transcribe(&config, args, cli.quiet).await?;
        }
        Commands::History { action } => {
            let config = load_config(cli.config.as_deref())?;
            run_history(&config, action).await?;
        }
        Commands::Url { path, ttl } => {
            let config = load_config(cli.config.as_deref())?;
            run_url(&config, &path, ttl).await?;
        }
        Commands::Config { action } => {
            run_config(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "scribe", &mut std::io::stdout());
        }
    }
    Ok(())
}

/// Load configuration from the given path or the default location,
/// then apply environment overrides.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

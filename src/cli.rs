//! Command-line interface for scribe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Transcribe audio files with streaming output, AI review and history
#[derive(Parser, Debug)]
#[command(
    name = "scribe",
    version,
    about = "Transcribe audio files with streaming output, AI review and history"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress and notices (transcription text is still printed)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a TTL string.
///
/// Accepts bare seconds (`900`) and anything `humantime` understands
/// (`30s`, `15m`, `1h30m`). Zero is rejected.
fn parse_ttl(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let ttl = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if ttl.is_zero() {
        return Err("TTL must be greater than zero".to_string());
    }
    Ok(ttl)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload an audio file and stream its transcription
    Transcribe(TranscribeArgs),

    /// Browse the transcription history
    History {
        /// Action to perform
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Print a time-limited download URL for an uploaded file
    Url {
        /// Storage path, as shown by `scribe history show`
        path: String,

        /// How long the URL stays valid. Examples: 30s, 15m, 1h
        #[arg(long, value_name = "DURATION", default_value = "15m", value_parser = parse_ttl)]
        ttl: Duration,
    },

    /// Manage configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options of a single transcription job
#[derive(Args, Debug, Clone)]
pub struct TranscribeArgs {
    /// Audio file to transcribe
    pub file: PathBuf,

    /// What the recording is about (required)
    #[arg(short, long)]
    pub subject: String,

    /// Model identifier (default: from config)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Extra instructions for this transcription
    #[arg(short, long, value_name = "TEXT")]
    pub instructions: Option<String>,

    /// Do not label speakers
    #[arg(long)]
    pub no_speaker_labels: bool,

    /// Add timestamps to the transcription
    #[arg(long)]
    pub timestamps: bool,

    /// Skip the summary
    #[arg(long)]
    pub no_summary: bool,

    /// Skip the AI review
    #[arg(long)]
    pub no_review: bool,

    /// Reference material for the model (repeatable)
    #[arg(long = "reference", value_name = "FILE")]
    pub references: Vec<PathBuf>,
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List records, newest first
    List {
        /// Show at most this many records
        #[arg(short = 'n', long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Show one record in full
    Show {
        /// Record id
        id: String,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,
    },

    /// Print the history again whenever it changes (Ctrl+C to stop)
    Follow,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcribe_args(cli: Cli) -> TranscribeArgs {
        match cli.command {
            Commands::Transcribe(args) => args,
            other => panic!("Expected Transcribe command, got {:?}", other),
        }
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["scribe"]).is_err());
    }

    #[test]
    fn test_parse_transcribe_defaults() {
        let cli =
            Cli::try_parse_from(["scribe", "transcribe", "meeting.mp3", "--subject", "Sync"])
                .unwrap();
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());

        let args = transcribe_args(cli);
        assert_eq!(args.file, PathBuf::from("meeting.mp3"));
        assert_eq!(args.subject, "Sync");
        assert!(args.model.is_none());
        assert!(args.instructions.is_none());
        assert!(!args.no_speaker_labels);
        assert!(!args.timestamps);
        assert!(!args.no_summary);
        assert!(!args.no_review);
        assert!(args.references.is_empty());
    }

    #[test]
    fn test_transcribe_requires_subject() {
        let result = Cli::try_parse_from(["scribe", "transcribe", "meeting.mp3"]);
        assert!(result.is_err(), "--subject should be required");
    }

    #[test]
    fn test_parse_transcribe_all_options() {
        let cli = Cli::try_parse_from([
            "scribe",
            "transcribe",
            "call.wav",
            "-s",
            "Interview",
            "--model",
            "gemini-2.5-pro",
            "-i",
            "Use British spelling",
            "--no-speaker-labels",
            "--timestamps",
            "--no-summary",
            "--no-review",
            "--reference",
            "agenda.pdf",
            "--reference",
            "notes.txt",
        ])
        .unwrap();

        let args = transcribe_args(cli);
        assert_eq!(args.subject, "Interview");
        assert_eq!(args.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(args.instructions.as_deref(), Some("Use British spelling"));
        assert!(args.no_speaker_labels);
        assert!(args.timestamps);
        assert!(args.no_summary);
        assert!(args.no_review);
        assert_eq!(
            args.references,
            vec![PathBuf::from("agenda.pdf"), PathBuf::from("notes.txt")]
        );
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["scribe", "-vv", "history", "list"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scribe",
            "history",
            "list",
            "--quiet",
            "--config",
            "/tmp/scribe.toml",
        ])
        .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/scribe.toml")));
    }

    #[test]
    fn test_parse_history_actions() {
        let cli = Cli::try_parse_from(["scribe", "history", "list", "-n", "5"]).unwrap();
        match cli.command {
            Commands::History {
                action: HistoryAction::List { limit },
            } => assert_eq!(limit, Some(5)),
            other => panic!("Expected history list, got {:?}", other),
        }

        let cli = Cli::try_parse_from(["scribe", "history", "show", "abc"]).unwrap();
        match cli.command {
            Commands::History {
                action: HistoryAction::Show { id },
            } => assert_eq!(id, "abc"),
            other => panic!("Expected history show, got {:?}", other),
        }

        let cli = Cli::try_parse_from(["scribe", "history", "delete", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                action: HistoryAction::Delete { .. }
            }
        ));

        let cli = Cli::try_parse_from(["scribe", "history", "follow"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                action: HistoryAction::Follow
            }
        ));
    }

    #[test]
    fn test_history_show_requires_id() {
        assert!(Cli::try_parse_from(["scribe", "history", "show"]).is_err());
    }

    #[test]
    fn test_parse_url_default_ttl() {
        let cli = Cli::try_parse_from(["scribe", "url", "uploads/u1/1-a.mp3"]).unwrap();
        match cli.command {
            Commands::Url { path, ttl } => {
                assert_eq!(path, "uploads/u1/1-a.mp3");
                assert_eq!(ttl, Duration::from_secs(15 * 60));
            }
            other => panic!("Expected Url command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_url_custom_ttl() {
        let cli = Cli::try_parse_from(["scribe", "url", "p", "--ttl", "1h30m"]).unwrap();
        match cli.command {
            Commands::Url { ttl, .. } => assert_eq!(ttl, Duration::from_secs(5400)),
            other => panic!("Expected Url command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ttl_formats() {
        assert_eq!(parse_ttl("900"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_ttl("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_ttl(" 2m "), Ok(Duration::from_secs(120)));
        assert!(parse_ttl("0").is_err());
        assert!(parse_ttl("soon").is_err());
        assert!(parse_ttl("").is_err());
    }

    #[test]
    fn test_parse_url_rejects_bad_ttl() {
        assert!(Cli::try_parse_from(["scribe", "url", "p", "--ttl", "abc"]).is_err());
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["scribe", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));

        let cli = Cli::try_parse_from(["scribe", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Init { force },
            } => assert!(force),
            other => panic!("Expected config init, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["scribe", "completions", "zsh"]).unwrap();
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, Shell::Zsh),
            other => panic!("Expected Completions command, got {:?}", other),
        }
        assert!(Cli::try_parse_from(["scribe", "completions", "tcsh"]).is_err());
    }
}

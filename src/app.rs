//! Command handlers behind the `scribe` binary.
//!
//! Wires the file-backed stores and the Gemini client into a [`Pipeline`]
//! and renders job events on the terminal: transcription text on stdout,
//! progress and reports on stderr.

use crate::cli::{ConfigAction, HistoryAction, TranscribeArgs};
use crate::config::{self, Config};
use crate::defaults;
use crate::error::{Result, ScribeError, ValidationError};
use crate::generation::GeminiClient;
use crate::history::{FileHistoryStore, HistoryStore};
use crate::identity::{self, UserId};
use crate::output;
use crate::pipeline::{
    JobEvent, JobOutcome, Pipeline, PipelineConfig, ReferenceFile, Session, TranscriptionJob,
    TranscriptionOptions,
};
use crate::storage::{FsObjectStore, LocalFile, ObjectStore};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Identity and stores shared by every command.
pub struct Context {
    pub user: UserId,
    pub store: Arc<FsObjectStore>,
    pub history: Arc<FileHistoryStore>,
}

impl Context {
    pub fn open(config: &Config) -> Result<Self> {
        let user = identity::resolve(&config.identity, &config::data_dir())?;
        tracing::debug!(%user, "identity resolved");
        Ok(Self {
            user,
            store: Arc::new(FsObjectStore::new(
                &config.storage_root(),
                &config.storage.bucket,
            )),
            history: Arc::new(FileHistoryStore::new(config.history_root())),
        })
    }
}

/// Per-job options from the command line, falling back to the configured model.
pub fn options_from_args(args: &TranscribeArgs, default_model: &str) -> Result<TranscriptionOptions> {
    let reference_files = args
        .references
        .iter()
        .map(|path| reference_file(path))
        .collect::<Result<Vec<_>>>()?;

    Ok(TranscriptionOptions {
        model: args
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string()),
        subject: args.subject.trim().to_string(),
        transcription_instructions: args.instructions.clone().unwrap_or_default(),
        speaker_labels: !args.no_speaker_labels,
        add_timestamps: args.timestamps,
        generate_summary: !args.no_summary,
        review: !args.no_review,
        reference_files,
    })
}

fn reference_file(path: &Path) -> Result<ReferenceFile> {
    let metadata = std::fs::metadata(path).map_err(|e| ValidationError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(ReferenceFile {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        size: metadata.len(),
    })
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        // SAFETY: hardcoded template string, always valid
        #[allow(clippy::expect_used)]
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .expect("hardcoded progress bar template")
            .progress_chars("#>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Run one transcription job in the foreground.
///
/// Fragments are printed to stdout as they arrive. Ctrl+C cancels the job;
/// a cancelled job is not an error.
pub async fn run_transcribe(config: &Config, args: TranscribeArgs, quiet: bool) -> Result<()> {
    config.validate()?;
    let ctx = Context::open(config)?;

    let api_key = config.generation.api_key.as_deref().unwrap_or_default();
    let generator = Arc::new(GeminiClient::new(api_key, &config.generation.base_url)?);

    let file = LocalFile::open(&args.file)?;
    let options = options_from_args(&args, &config.generation.model)?;
    if !defaults::KNOWN_MODELS.contains(&options.model.as_str()) {
        tracing::warn!(model = %options.model, "unrecognized model id, passing it through");
    }
    tracing::info!(file = %file.name, model = %options.model, "starting transcription");
    let job = TranscriptionJob::new(file, options, config.settings.clone());

    let pipeline = Pipeline::new(ctx.user.clone(), ctx.store, generator, ctx.history)
        .with_config(PipelineConfig {
            audio_delivery: config.storage.audio_delivery,
            ..PipelineConfig::default()
        });
    let mut session = Session::new(pipeline);
    let mut handle = session.submit(job);

    let color = std::io::stderr().is_terminal();
    let mut stdout = std::io::stdout();
    let mut bar: Option<ProgressBar> = None;
    let mut interrupted = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let finished = loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(JobEvent::Status { status, progress }) => {
                    if quiet {
                        continue;
                    }
                    let bar = bar.get_or_insert_with(progress_bar);
                    bar.set_message(output::status_message(status));
                    bar.set_position(progress.clamp(0.0, 100.0).round() as u64);
                }
                Some(JobEvent::Fragment(text)) => {
                    // The bar would redraw over streamed text
                    if let Some(bar) = bar.take() {
                        bar.finish_and_clear();
                    }
                    write!(stdout, "{text}")?;
                    stdout.flush()?;
                }
                Some(JobEvent::TranscriptionComplete { text }) => {
                    if !text.ends_with('\n') {
                        writeln!(stdout)?;
                    }
                }
                Some(JobEvent::Warning { stage, message }) => {
                    tracing::debug!(%stage, "stage warning");
                    let line = output::warning_line(&message, color);
                    match &bar {
                        Some(bar) => bar.suspend(|| eprintln!("{line}")),
                        None => eprintln!("{line}"),
                    }
                }
                Some(JobEvent::Finished(outcome)) => break Some(outcome),
                None => break None,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                session.cancel_active();
                if !quiet {
                    eprintln!("\nCancelling...");
                }
            }
        }
    };
    if let Some(bar) = bar.take() {
        bar.finish_and_clear();
    }

    let outcome = match finished {
        Some(outcome) => outcome,
        None => handle.wait().await,
    };
    match outcome {
        JobOutcome::Succeeded(result) => {
            if quiet {
                for warning in &result.warnings {
                    eprintln!("{}", output::warning_line(warning, color));
                }
            } else {
                eprint!("{}", output::render_job_result(&result, color));
            }
            Ok(())
        }
        JobOutcome::Failed { message } => Err(ScribeError::Other(message)),
        JobOutcome::Cancelled => {
            if !quiet {
                eprintln!("Transcription cancelled.");
            }
            Ok(())
        }
    }
}

/// `scribe history ...`
pub async fn run_history(config: &Config, action: HistoryAction) -> Result<()> {
    let ctx = Context::open(config)?;
    let color = std::io::stdout().is_terminal();

    match action {
        HistoryAction::List { limit } => {
            let records = ctx.history.list(&ctx.user).await?;
            if records.is_empty() {
                eprintln!("No transcriptions yet.");
            }
            for record in records.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{}", output::history_row(record, color));
            }
        }
        HistoryAction::Show { id } => {
            let record = ctx.history.get(&ctx.user, &id).await?;
            print!("{}", output::render_record(&record, color));
        }
        HistoryAction::Delete { id } => {
            ctx.history.delete(&ctx.user, &id).await?;
            eprintln!("Deleted {id}");
        }
        HistoryAction::Follow => {
            let mut subscription = ctx.history.subscribe(&ctx.user).await?;
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    snapshot = subscription.next() => {
                        let Some(records) = snapshot else { break };
                        println!("--- {} record(s) ---", records.len());
                        for record in &records {
                            println!("{}", output::history_row(record, color));
                        }
                    }
                    _ = &mut ctrl_c => break,
                }
            }
        }
    }
    Ok(())
}

/// `scribe url <PATH>`
pub async fn run_url(config: &Config, path: &str, ttl: Duration) -> Result<()> {
    let ctx = Context::open(config)?;
    let url = ctx.store.signed_download_url(&ctx.user, path, ttl).await?;
    println!("{url}");
    Ok(())
}

/// Configuration with secrets masked, as TOML.
pub fn display_config(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if let Some(key) = shown.generation.api_key.as_mut() {
        *key = "********".to_string();
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| ScribeError::Other(format!("Failed to serialize config: {e}")))
}

/// `scribe config ...`
///
/// Works without an existing config file: `show` prints the defaults and
/// `init` creates the file.
pub fn run_config(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&path)?.with_env_overrides();
            print!("{}", display_config(&config)?);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            init_config_file(&path, force)?;
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Write the default configuration to `path`. Refuses to overwrite unless `force`.
pub fn init_config_file(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ScribeError::Other(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::NewHistoryRecord;

    fn args(subject: &str) -> TranscribeArgs {
        TranscribeArgs {
            file: PathBuf::from("meeting.mp3"),
            subject: subject.to_string(),
            model: None,
            instructions: None,
            no_speaker_labels: false,
            timestamps: false,
            no_summary: false,
            no_review: false,
            references: Vec::new(),
        }
    }

    fn local_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.identity.user_id = Some("u1".to_string());
        config.storage.root = Some(dir.join("storage"));
        config.history.root = Some(dir.join("history"));
        config
    }

    #[test]
    fn options_follow_flags() {
        let mut a = args("  Standup ");
        a.model = Some("gemini-2.5-pro".into());
        a.instructions = Some("British spelling".into());
        a.no_speaker_labels = true;
        a.timestamps = true;
        a.no_review = true;

        let options = options_from_args(&a, "default-model").unwrap();
        assert_eq!(options.subject, "Standup");
        assert_eq!(options.model, "gemini-2.5-pro");
        assert_eq!(options.transcription_instructions, "British spelling");
        assert!(!options.speaker_labels);
        assert!(options.add_timestamps);
        assert!(options.generate_summary);
        assert!(!options.review);
    }

    #[test]
    fn options_use_configured_model_and_stat_references() {
        let dir = tempfile::tempdir().unwrap();
        let agenda = dir.path().join("agenda.pdf");
        std::fs::write(&agenda, vec![0u8; 2048]).unwrap();

        let mut a = args("Sync");
        a.references = vec![agenda];
        let options = options_from_args(&a, "default-model").unwrap();
        assert_eq!(options.model, "default-model");
        assert_eq!(
            options.reference_files,
            vec![ReferenceFile {
                name: "agenda.pdf".into(),
                size: 2048
            }]
        );
    }

    #[test]
    fn missing_reference_is_validation_error() {
        let mut a = args("Sync");
        a.references = vec![PathBuf::from("/nonexistent/notes.txt")];
        let err = options_from_args(&a, "m").unwrap_err();
        assert!(matches!(
            err,
            ScribeError::Validation(ValidationError::Unreadable { .. })
        ));
    }

    #[test]
    fn display_config_masks_api_key() {
        let mut config = Config::default();
        config.generation.api_key = Some("secret-key".into());
        let shown = display_config(&config).unwrap();
        assert!(!shown.contains("secret-key"));
        assert!(shown.contains("********"));
        assert!(shown.contains("[generation]"));
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scribe").join("config.toml");

        init_config_file(&path, false).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        assert!(init_config_file(&path, false).is_err());
        init_config_file(&path, true).unwrap();
    }

    #[tokio::test]
    async fn history_commands_use_configured_stores() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let ctx = Context::open(&config).unwrap();
        assert_eq!(ctx.user.as_str(), "u1");

        let record = NewHistoryRecord {
            file_name: "a.mp3".into(),
            file_storage_path: "uploads/u1/1-a.mp3".into(),
            transcription: "Hello world.".into(),
            corrected_transcription: None,
            summary: None,
            changelog: None,
            options: TranscriptionOptions::with_subject("s"),
        };
        let id = ctx.history.create(&ctx.user, record).await.unwrap();

        run_history(&config, HistoryAction::List { limit: Some(5) })
            .await
            .unwrap();
        run_history(&config, HistoryAction::Show { id: id.clone() })
            .await
            .unwrap();
        run_history(&config, HistoryAction::Delete { id: id.clone() })
            .await
            .unwrap();
        assert!(
            run_history(&config, HistoryAction::Show { id })
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn url_for_missing_object_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let result = run_url(&config, "uploads/u1/1-missing.mp3", Duration::from_secs(60)).await;
        assert!(matches!(result, Err(ScribeError::SignedUrl(_))));
    }

    #[tokio::test]
    async fn transcribe_fails_fast_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let result = run_transcribe(&config, args("Sync"), true).await;
        assert!(matches!(
            result,
            Err(ScribeError::ConfigInvalidValue { ref key, .. }) if key == "generation.api_key"
        ));
    }
}

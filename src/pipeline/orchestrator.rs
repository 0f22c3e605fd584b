//! Job orchestration: upload, stream, fork, review, summarize, persist.

use crate::config::AudioDelivery;
use crate::defaults;
use crate::error::{GenerationError, UploadError};
use crate::generation::{
    FragmentStream, MediaSource, TextGenerator, build_instructions, build_prompt,
    review_transcription, stream_transcription, summarize_transcription,
};
use crate::history::{HistoryStore, NewHistoryRecord};
use crate::identity::UserId;
use crate::pipeline::cancel::until_cancelled;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::fork::fork;
use crate::pipeline::types::{
    JobEvent, JobOutcome, JobResult, ProcessingStatus, Stage, TranscriptionJob,
};
use crate::pipeline::validate::validate_job;
use crate::storage::{ObjectStore, ProgressFn};
use base64::{Engine as _, engine::general_purpose};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Share of the overall progress bar taken by the upload.
const UPLOAD_SHARE: f64 = 0.3;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How audio reaches the generation service
    pub audio_delivery: AudioDelivery,
    /// Lifetime of signed URLs handed to the model
    pub signed_url_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audio_delivery: AudioDelivery::Inline,
            signed_url_ttl: Duration::from_secs(defaults::SIGNED_URL_TTL_SECS),
        }
    }
}

/// Transcription pipeline bound to one user and one set of backends.
///
/// Cheap to clone; every job gets its own task, events channel and
/// cancellation token.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    user: UserId,
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn TextGenerator>,
    history: Arc<dyn HistoryStore>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    /// Creates a new pipeline with default config and error reporter.
    pub fn new(
        user: UserId,
        store: Arc<dyn ObjectStore>,
        generator: Arc<dyn TextGenerator>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config: PipelineConfig::default(),
            user,
            store,
            generator,
            history,
            error_reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Start a job in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, job: TranscriptionJob) -> JobHandle {
        let token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let run = JobRun {
            pipeline: self.clone(),
            job,
            events: events_tx.clone(),
            token: token.clone(),
        };

        let task = tokio::spawn(async move {
            let outcome = run.run().await;
            match &outcome {
                JobOutcome::Succeeded(result) => tracing::info!(
                    record = result.record_id.as_deref().unwrap_or("-"),
                    warnings = result.warnings.len(),
                    "job finished"
                ),
                JobOutcome::Failed { message } => tracing::info!("job failed: {message}"),
                JobOutcome::Cancelled => tracing::info!("job cancelled"),
            }
            if events_tx.send(JobEvent::Finished(outcome.clone())).is_err() {
                tracing::trace!("job handle dropped before the final event");
            }
            outcome
        });

        JobHandle {
            token,
            events: events_rx,
            task,
        }
    }
}

/// Handle to a running job.
pub struct JobHandle {
    token: CancellationToken,
    events: mpsc::UnboundedReceiver<JobEvent>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Request cancellation. The job stops at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this job, for use from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next event. `None` after the final [`JobEvent::Finished`].
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Wait for the job to end, discarding any unread events.
    pub async fn wait(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => JobOutcome::Cancelled,
            Err(e) => JobOutcome::Failed {
                message: format!("job task failed: {e}"),
            },
        }
    }

    /// Drain every event and return them with the outcome.
    pub async fn collect(mut self) -> (Vec<JobEvent>, JobOutcome) {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        let outcome = self.wait().await;
        (events, outcome)
    }
}

/// State of one running job.
struct JobRun {
    pipeline: Pipeline,
    job: TranscriptionJob,
    events: mpsc::UnboundedSender<JobEvent>,
    token: CancellationToken,
}

impl JobRun {
    fn emit(&self, event: JobEvent) {
        // The receiver may be gone; the job still runs to completion.
        if self.events.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }

    fn status(&self, status: ProcessingStatus, progress: f64) {
        tracing::debug!(%status, progress, "stage");
        self.emit(JobEvent::Status { status, progress });
    }

    fn fail(&self, stage: Stage, message: String) -> JobOutcome {
        self.pipeline
            .error_reporter
            .report(stage, &StageError::Fatal(message.clone()));
        JobOutcome::Failed { message }
    }

    fn fail_generation(&self, error: &GenerationError) -> JobOutcome {
        self.pipeline
            .error_reporter
            .report(Stage::Transcription, &StageError::Fatal(error.to_string()));
        JobOutcome::Failed {
            message: error.user_message(),
        }
    }

    fn warn(&self, stage: Stage, message: String, result: &mut JobResult) {
        self.pipeline
            .error_reporter
            .report(stage, &StageError::Recoverable(message.clone()));
        self.emit(JobEvent::Warning {
            stage,
            message: message.clone(),
        });
        result.warnings.push(message);
    }

    async fn run(&self) -> JobOutcome {
        let options = &self.job.options;
        let settings = &self.job.settings;
        let generator = self.pipeline.generator.as_ref();
        tracing::info!(
            file = %self.job.file.name,
            model = %options.model,
            "job started"
        );

        if let Err(e) = validate_job(&self.job) {
            return self.fail(Stage::Upload, e.to_string());
        }

        // Upload
        if self.token.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        self.status(ProcessingStatus::Uploading, 0.0);
        let storage_path = match self.upload().await {
            Ok(path) => path,
            Err(UploadError::Cancelled) => return JobOutcome::Cancelled,
            Err(e) => return self.fail(Stage::Upload, e.to_string()),
        };

        // Transcription
        if self.token.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        self.status(
            ProcessingStatus::Transcribing,
            ProcessingStatus::Transcribing.base_progress(),
        );
        let media = match self.media(&storage_path).await {
            Ok(media) => media,
            Err(message) => return self.fail(Stage::Transcription, message),
        };
        let instructions = build_instructions(
            &settings.standard_instructions,
            &options.transcription_instructions,
            options.speaker_labels,
            options.add_timestamps,
        );
        let reference_names: Vec<String> = options
            .reference_files
            .iter()
            .map(|r| r.name.clone())
            .collect();
        let prompt = build_prompt(&options.subject, &instructions, &reference_names);

        if self.token.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        let stream = match until_cancelled(
            &self.token,
            stream_transcription(generator, &options.model, prompt, media),
        )
        .await
        {
            None => return JobOutcome::Cancelled,
            Some(Ok(stream)) => stream,
            Some(Err(e)) => return self.fail_generation(&e),
        };
        let transcription = match self.accumulate(stream).await {
            Ok(Some(text)) => text,
            Ok(None) => return JobOutcome::Cancelled,
            Err(e) => return self.fail_generation(&e),
        };
        self.emit(JobEvent::TranscriptionComplete {
            text: transcription.clone(),
        });

        // From here on the transcription is delivered; failures become warnings.
        let mut result = JobResult {
            storage_path,
            transcription,
            ..JobResult::default()
        };

        if options.review {
            if self.token.is_cancelled() {
                return JobOutcome::Cancelled;
            }
            self.status(
                ProcessingStatus::Reviewing,
                ProcessingStatus::Reviewing.base_progress(),
            );
            let review = review_transcription(
                generator,
                &options.model,
                &result.transcription,
                &settings.review,
            );
            match until_cancelled(&self.token, review).await {
                None => return JobOutcome::Cancelled,
                Some(Ok(review)) => {
                    result.corrected_transcription = Some(review.corrected_transcription);
                    result.changelog = Some(review.changelog);
                }
                Some(Err(e)) => self.warn(
                    Stage::Review,
                    format!("Review failed: {}", e.user_message()),
                    &mut result,
                ),
            }
        }

        if options.generate_summary {
            if self.token.is_cancelled() {
                return JobOutcome::Cancelled;
            }
            self.status(
                ProcessingStatus::Summarizing,
                ProcessingStatus::Summarizing.base_progress(),
            );
            let text = result.best_text().to_string();
            let summary = summarize_transcription(generator, &options.model, &text);
            match until_cancelled(&self.token, summary).await {
                None => return JobOutcome::Cancelled,
                Some(Ok(summary)) => result.summary = Some(summary.summary),
                Some(Err(e)) => self.warn(
                    Stage::Summary,
                    format!("Summary failed: {}", e.user_message()),
                    &mut result,
                ),
            }
        }

        // Persistence
        if self.token.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        self.status(
            ProcessingStatus::Saving,
            ProcessingStatus::Saving.base_progress(),
        );
        let record = NewHistoryRecord {
            file_name: self.job.file.name.clone(),
            file_storage_path: result.storage_path.clone(),
            transcription: result.transcription.clone(),
            corrected_transcription: result.corrected_transcription.clone(),
            summary: result.summary.clone(),
            changelog: result.changelog.clone(),
            options: options.clone(),
        };
        // Not raced against cancellation: a started write is allowed to finish.
        match self.pipeline.history.create(&self.pipeline.user, record).await {
            Ok(id) => result.record_id = Some(id),
            Err(e) => self.warn(
                Stage::Persistence,
                format!("Transcription finished but could not be saved to history: {e}"),
                &mut result,
            ),
        }
        self.status(ProcessingStatus::Saving, 100.0);

        JobOutcome::Succeeded(result)
    }

    /// Upload the job's file, returning its storage path.
    async fn upload(&self) -> Result<String, UploadError> {
        let events = self.events.clone();
        let progress: ProgressFn = Box::new(move |percent| {
            let update = JobEvent::Status {
                status: ProcessingStatus::Uploading,
                progress: percent * UPLOAD_SHARE,
            };
            if events.send(update).is_err() {
                tracing::trace!("event receiver dropped");
            }
        });
        let task = self.pipeline.store.begin_upload(
            &self.job.file,
            &self.pipeline.user,
            progress,
            self.token.child_token(),
        );
        let path = task.path().to_string();
        tracing::debug!(%path, store = self.pipeline.store.name(), "uploading");
        task.wait().await?;
        Ok(path)
    }

    /// Audio reference for the model, according to the delivery mode.
    async fn media(&self, storage_path: &str) -> Result<MediaSource, String> {
        let mime_type = self.job.file.mime_type.clone();
        match self.pipeline.config.audio_delivery {
            AudioDelivery::Inline => {
                let bytes = self
                    .job
                    .file
                    .read_bytes()
                    .await
                    .map_err(|e| format!("Cannot read {}: {e}", self.job.file.name))?;
                Ok(MediaSource::Inline {
                    mime_type,
                    data: general_purpose::STANDARD.encode(bytes),
                })
            }
            AudioDelivery::SignedUrl => {
                let url = self
                    .pipeline
                    .store
                    .signed_download_url(
                        &self.pipeline.user,
                        storage_path,
                        self.pipeline.config.signed_url_ttl,
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(MediaSource::Url { mime_type, url })
            }
        }
    }

    /// Fork the stream into the UI feed and the accumulator, and drain both.
    ///
    /// `Ok(None)` when the job was cancelled mid-stream.
    async fn accumulate(&self, stream: FragmentStream) -> Result<Option<String>, GenerationError> {
        let (mut feed, mut buffer, _pump) = fork(stream, &self.token);

        let events = self.events.clone();
        let feed_task = tokio::spawn(async move {
            while let Some(item) = feed.next().await {
                let Ok(text) = item else {
                    break;
                };
                if events.send(JobEvent::Fragment(text)).is_err() {
                    feed.cancel();
                    break;
                }
            }
        });

        let mut text = String::new();
        let mut failure = None;
        while let Some(item) = buffer.next().await {
            match item {
                Ok(fragment) => text.push_str(&fragment),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Let the feed deliver everything before the job moves on.
        if let Err(e) = feed_task.await {
            tracing::warn!("fragment feed task failed: {e}");
        }

        if self.token.is_cancelled() {
            return Ok(None);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(Some(text)),
        }
    }
}

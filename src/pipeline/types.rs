//! Data types for the transcription pipeline.

use crate::config::GlobalSettings;
use crate::defaults;
use crate::storage::LocalFile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference material attached to a job. Only its name and size are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFile {
    pub name: String,
    pub size: u64,
}

/// Per-job options, captured when the job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionOptions {
    /// Model identifier, passed to the generation service uninterpreted.
    pub model: String,
    pub subject: String,
    pub transcription_instructions: String,
    pub speaker_labels: bool,
    pub add_timestamps: bool,
    pub generate_summary: bool,
    pub review: bool,
    pub reference_files: Vec<ReferenceFile>,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            subject: String::new(),
            transcription_instructions: String::new(),
            speaker_labels: true,
            add_timestamps: false,
            generate_summary: true,
            review: true,
            reference_files: Vec::new(),
        }
    }
}

impl TranscriptionOptions {
    pub fn with_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }
}

/// One user-initiated run.
///
/// Owns the file and a snapshot of the settings; nothing outside the job can
/// change them once it is submitted.
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub file: LocalFile,
    pub options: TranscriptionOptions,
    pub settings: GlobalSettings,
}

impl TranscriptionJob {
    pub fn new(file: LocalFile, options: TranscriptionOptions, settings: GlobalSettings) -> Self {
        Self {
            file,
            options,
            settings,
        }
    }
}

/// Pipeline stage, used for status reporting and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Transcription,
    Review,
    Summary,
    Persistence,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Transcription => "transcription",
            Stage::Review => "review",
            Stage::Summary => "summary",
            Stage::Persistence => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the job is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Uploading,
    Transcribing,
    Reviewing,
    Summarizing,
    Saving,
}

impl ProcessingStatus {
    /// Overall progress shown when the stage starts.
    pub fn base_progress(&self) -> f64 {
        match self {
            ProcessingStatus::Uploading => 0.0,
            ProcessingStatus::Transcribing => 30.0,
            ProcessingStatus::Reviewing => 60.0,
            ProcessingStatus::Summarizing => 80.0,
            ProcessingStatus::Saving => 90.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingStatus::Uploading => "Uploading audio",
            ProcessingStatus::Transcribing => "Transcribing",
            ProcessingStatus::Reviewing => "Reviewing transcription",
            ProcessingStatus::Summarizing => "Generating summary",
            ProcessingStatus::Saving => "Saving to history",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a finished job produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobResult {
    pub storage_path: String,
    pub transcription: String,
    pub corrected_transcription: Option<String>,
    pub changelog: Option<String>,
    pub summary: Option<String>,
    /// Store-assigned id, `None` when saving failed.
    pub record_id: Option<String>,
    /// Non-blocking failures of review, summary or persistence.
    pub warnings: Vec<String>,
}

impl JobResult {
    /// Corrected text when the review succeeded, else the raw transcription.
    pub fn best_text(&self) -> &str {
        self.corrected_transcription
            .as_deref()
            .unwrap_or(&self.transcription)
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Streaming completed; post-stream failures are listed as warnings.
    Succeeded(JobResult),
    /// The job stopped before or during streaming. `message` is user-facing.
    Failed { message: String },
    /// Cancelled by the user. Never reported as an error.
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded(_))
    }
}

/// UI-facing notification from a running job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Stage change or progress update. `progress` is in `[0, 100]`.
    Status {
        status: ProcessingStatus,
        progress: f64,
    },
    /// A transcription fragment, in stream order.
    Fragment(String),
    /// The transcription stream ended.
    TranscriptionComplete { text: String },
    /// Non-blocking failure of a post-stream stage.
    Warning { stage: Stage, message: String },
    /// The job ended. Always the last event.
    Finished(JobOutcome),
}

//! Transcription pipeline.
//!
//! A job runs as one tokio task: validate, upload, stream the transcription,
//! fork the stream into a live feed and an accumulator, then review,
//! summarize and persist. Every stage boundary checks the job's
//! cancellation token.

pub mod cancel;
pub mod error;
pub mod fork;
pub mod orchestrator;
pub mod session;
pub mod types;
pub mod validate;

pub use error::{ErrorReporter, LogReporter, StageError};
pub use fork::{Branch, fork};
pub use orchestrator::{JobHandle, Pipeline, PipelineConfig};
pub use session::Session;
pub use types::{
    JobEvent, JobOutcome, JobResult, ProcessingStatus, ReferenceFile, Stage, TranscriptionJob,
    TranscriptionOptions,
};
pub use validate::{validate_file, validate_job};

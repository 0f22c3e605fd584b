//! Text-generation service and the stages built on it.
//!
//! The service exposes two calls: a streaming call used for transcription and
//! a single round-trip structured call used by review and summary. Stage
//! modules build prompts and validate responses; backends only move text.

#[cfg(feature = "gemini")]
pub mod gemini;
pub mod mock;
pub mod review;
pub mod structured;
pub mod summary;
pub mod transcribe;

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;
pub use mock::MockGenerator;
pub use review::{ReviewOutput, review_transcription};
pub use summary::{SummaryOutput, summarize_transcription};
pub use transcribe::{build_instructions, build_prompt, stream_transcription};

use crate::error::GenerationError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Ordered, single-pass sequence of text fragments.
///
/// Ends with `None`; an `Err` item means the generation failed mid-stream.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

/// Audio attached to a transcription request.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// Base64-encoded audio carried in the request body.
    Inline { mime_type: String, data: String },
    /// Reference to audio the service downloads itself.
    Url { mime_type: String, url: String },
}

/// Request for a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub model: String,
    pub prompt: String,
    pub media: Option<MediaSource>,
}

/// Named string fields a structured response must contain.
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseSchema {
    pub name: &'static str,
    /// `(field, description)` pairs. Every field is a required string.
    pub fields: &'static [(&'static str, &'static str)],
}

/// Request for a single round-trip structured generation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub model: String,
    pub prompt: String,
    pub schema: &'static ResponseSchema,
}

/// Text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single round-trip call. Returns the raw response text, which the caller
    /// validates against `request.schema`.
    async fn generate(&self, request: StructuredRequest) -> Result<String, GenerationError>;

    /// Start a streaming call.
    ///
    /// Fails before the first fragment when the request is rejected outright.
    async fn generate_stream(&self, request: StreamRequest)
    -> Result<FragmentStream, GenerationError>;

    /// Name for logging.
    fn name(&self) -> &str;
}

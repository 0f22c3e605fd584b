//! Default configuration constants for scribe.
//!
//! Shared by the config types, the pipeline and the CLI so the same values
//! are used everywhere.

/// Default generation model.
///
/// The identifier is passed to the provider unchanged.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Models offered by the Gemini backend.
pub const KNOWN_MODELS: &[&str] = &["gemini-2.0-flash-lite", "gemini-2.5-flash", "gemini-2.5-pro"];

/// Base URL of the Generative Language REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default bucket name for the local object store.
pub const DEFAULT_BUCKET: &str = "scribe-uploads";

/// Maximum accepted audio file size (31 MiB) unless the limit is disabled.
pub const MAX_FILE_SIZE_BYTES: u64 = 31 * 1024 * 1024;

/// Accepted audio MIME types, paired with the file extensions they are inferred from.
pub const ACCEPTED_AUDIO_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "audio/mp4"),
    ("m4a", "audio/x-m4a"),
    ("webm", "audio/webm"),
    ("flac", "audio/flac"),
];

/// Lifetime of a signed download URL handed to the generation service.
pub const SIGNED_URL_TTL_SECS: u64 = 15 * 60;

/// Chunk size used when copying an upload into the object store.
pub const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;

/// Timeout for single round-trip generation calls (review, summary).
pub const GENERATE_TIMEOUT_SECS: u64 = 120;

/// Appended to the instructions when speaker labels are requested.
pub const SPEAKER_LABELS_INSTRUCTION: &str =
    "Please identify and label different speakers (e.g., Speaker 1, Speaker 2).";

/// Appended to the instructions when timestamps are requested.
pub const TIMESTAMPS_INSTRUCTION: &str =
    "Please include timestamps for key sections or speaker changes.";

/// Prefix of every upload path. Full form: `uploads/<user>/<millis>-<file>`.
pub const UPLOADS_PREFIX: &str = "uploads";

/// Application directory name under the XDG config/data directories.
pub const APP_DIR: &str = "scribe";

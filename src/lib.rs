//! scribe - audio transcription pipeline
//!
//! Uploads an audio file, streams a model transcription, optionally reviews
//! and summarizes it, and keeps the result in a per-user history.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod generation;
pub mod history;
pub mod identity;
pub mod logging;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod storage;

// Core traits (store → generate → persist)
pub use generation::TextGenerator;
pub use history::HistoryStore;
pub use storage::ObjectStore;

// Pipeline
pub use pipeline::{JobEvent, JobHandle, JobOutcome, Pipeline, PipelineConfig, Session};
pub use pipeline::{TranscriptionJob, TranscriptionOptions};

// Error handling
pub use error::{Result, ScribeError};

// Config
pub use config::{AudioDelivery, Config};

// Error reporting (for embedders)
pub use pipeline::error::{ErrorReporter, StageError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_only_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}

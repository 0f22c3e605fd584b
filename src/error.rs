//! Error types for scribe.
//!
//! Each pipeline stage has its own error enum so callers can tell the stages
//! apart; `ScribeError` wraps all of them for the crate-level `Result`.

use std::time::Duration;
use thiserror::Error;

/// Identity could not be established. Fatal for the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Authentication failed: {message}")]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Input rejected before any stage runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid file type {mime}. Please upload one of: {accepted}")]
    UnsupportedType { mime: String, accepted: String },

    #[error("File is too large ({size} bytes). Maximum size is {limit_mb}MB")]
    TooLarge { size: u64, limit_mb: u64 },

    #[error("Subject is required")]
    MissingSubject,

    #[error("Cannot read {path}: {message}")]
    Unreadable { path: String, message: String },
}

/// Failure of the upload stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Not authorized to write {path}")]
    Unauthorized { path: String },

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Upload failed: {message}")]
    Transport { message: String },
}

/// Failure to produce a signed download URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignedUrlError {
    #[error("File not found in storage at path: {path}")]
    NotFound { path: String },

    #[error("Not authorized to read {path}")]
    Unauthorized { path: String },

    #[error("Could not generate download URL: {message}")]
    Transport { message: String },
}

/// Failure of a text-generation call, streaming or single round-trip.
///
/// `Overloaded` and `RateLimited` are transient: the caller should retry later.
/// The other variants will fail the same way on retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Model overloaded: {message}")]
    Overloaded { message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Malformed model output: {message}")]
    Malformed { message: String },

    #[error("{message}")]
    Permanent { message: String },
}

impl GenerationError {
    /// True for failures that are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Overloaded { .. } | GenerationError::RateLimited { .. }
        )
    }

    /// Suggested wait before retrying, for transient failures only.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::Overloaded { .. } => Some(Duration::from_secs(30)),
            GenerationError::RateLimited { retry_after, .. } => {
                Some(retry_after.unwrap_or(Duration::from_secs(60)))
            }
            _ => None,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Overloaded { .. } => {
                "The transcription service is temporarily unavailable. Please try again later."
                    .to_string()
            }
            GenerationError::RateLimited { .. } => {
                "Too many requests to the transcription service. Please try again later."
                    .to_string()
            }
            GenerationError::Malformed { message } => {
                format!("Internal error: the model returned an unexpected response ({message})")
            }
            GenerationError::Permanent { message } => message.clone(),
        }
    }
}

/// Failure of the history store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("History record not found: {id}")]
    NotFound { id: String },

    #[error("History storage error: {message}")]
    Storage { message: String },

    #[error("History record could not be encoded: {message}")]
    Encoding { message: String },
}

#[derive(Error, Debug)]
pub enum ScribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Stage errors
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    SignedUrl(#[from] SignedUrlError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScribeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = ScribeError::ConfigInvalidValue {
            key: "storage.bucket".to_string(),
            message: "must not be empty".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for storage.bucket: must not be empty"
        );
    }

    #[test]
    fn test_auth_error_display() {
        let error: ScribeError = AuthError::new("no user id").into();
        assert_eq!(error.to_string(), "Authentication failed: no user id");
    }

    #[test]
    fn test_validation_too_large_display() {
        let error = ValidationError::TooLarge {
            size: 40_000_000,
            limit_mb: 31,
        };
        assert_eq!(
            error.to_string(),
            "File is too large (40000000 bytes). Maximum size is 31MB"
        );
    }

    #[test]
    fn test_upload_errors_are_distinct() {
        let unauthorized = UploadError::Unauthorized {
            path: "uploads/bob/x.mp3".to_string(),
        };
        let transport = UploadError::Transport {
            message: "disk full".to_string(),
        };
        assert_ne!(unauthorized, UploadError::Cancelled);
        assert_ne!(transport, UploadError::Cancelled);
        assert_eq!(transport.to_string(), "Upload failed: disk full");
    }

    #[test]
    fn test_signed_url_not_found_display() {
        let error = SignedUrlError::NotFound {
            path: "uploads/u/a.mp3".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "File not found in storage at path: uploads/u/a.mp3"
        );
    }

    #[test]
    fn test_generation_transient_classification() {
        let overloaded = GenerationError::Overloaded {
            message: "503".to_string(),
        };
        let limited = GenerationError::RateLimited {
            message: "429".to_string(),
            retry_after: Some(Duration::from_secs(5)),
        };
        let malformed = GenerationError::Malformed {
            message: "missing field".to_string(),
        };
        let permanent = GenerationError::Permanent {
            message: "bad audio".to_string(),
        };

        assert!(overloaded.is_transient());
        assert!(limited.is_transient());
        assert!(!malformed.is_transient());
        assert!(!permanent.is_transient());

        assert_eq!(limited.retry_after(), Some(Duration::from_secs(5)));
        assert!(overloaded.retry_after().is_some());
        assert_eq!(permanent.retry_after(), None);
    }

    #[test]
    fn test_generation_user_messages() {
        let overloaded = GenerationError::Overloaded {
            message: "503".to_string(),
        };
        assert!(overloaded.user_message().contains("temporarily unavailable"));

        let permanent = GenerationError::Permanent {
            message: "Quota exceeded".to_string(),
        };
        assert_eq!(permanent.user_message(), "Quota exceeded");

        let malformed = GenerationError::Malformed {
            message: "expected object".to_string(),
        };
        assert!(malformed.user_message().starts_with("Internal error"));
    }

    #[test]
    fn test_persistence_not_found_display() {
        let error = PersistenceError::NotFound {
            id: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "History record not found: abc");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: ScribeError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: ScribeError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_stage_errors_convert_transparently() {
        let error: ScribeError = GenerationError::Permanent {
            message: "bad input".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "bad input");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ScribeError>();
        assert_sync::<ScribeError>();
    }
}

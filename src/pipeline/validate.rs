//! Input checks run before any stage touches the network.

use crate::config::AdvancedSettings;
use crate::defaults;
use crate::error::ValidationError;
use crate::pipeline::types::TranscriptionJob;
use crate::storage::LocalFile;

/// Accepted MIME types as a comma-separated list, for error messages.
pub fn accepted_types() -> String {
    defaults::ACCEPTED_AUDIO_TYPES
        .iter()
        .map(|(_, mime)| *mime)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check the file's type and size.
pub fn validate_file(file: &LocalFile, advanced: &AdvancedSettings) -> Result<(), ValidationError> {
    if !defaults::ACCEPTED_AUDIO_TYPES
        .iter()
        .any(|(_, mime)| *mime == file.mime_type)
    {
        return Err(ValidationError::UnsupportedType {
            mime: file.mime_type.clone(),
            accepted: accepted_types(),
        });
    }
    if !advanced.disable_file_size_limit && file.size > defaults::MAX_FILE_SIZE_BYTES {
        return Err(ValidationError::TooLarge {
            size: file.size,
            limit_mb: defaults::MAX_FILE_SIZE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

/// Check everything the job needs before it starts.
pub fn validate_job(job: &TranscriptionJob) -> Result<(), ValidationError> {
    if job.options.subject.trim().is_empty() {
        return Err(ValidationError::MissingSubject);
    }
    validate_file(&job.file, &job.settings.advanced)
}

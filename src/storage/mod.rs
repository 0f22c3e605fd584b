//! Object storage for uploaded audio.
//!
//! An upload is started with [`ObjectStore::begin_upload`], which returns the
//! final storage path immediately together with a handle to the running
//! transfer. Paths are namespaced by user: `uploads/<user>/<millis>-<file>`.

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use crate::defaults;
use crate::error::{SignedUrlError, UploadError, ValidationError};
use crate::identity::UserId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress callback, receives a percentage in `[0, 100]`.
pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

/// A local audio file selected for transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl LocalFile {
    /// Stat a file and infer its MIME type from the extension.
    pub fn open(path: &Path) -> Result<Self, ValidationError> {
        let metadata = std::fs::metadata(path).map_err(|e| ValidationError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(ValidationError::Unreadable {
                path: path.display().to_string(),
                message: "not a regular file".to_string(),
            });
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            mime_type: mime_for_path(path),
            name,
            size: metadata.len(),
        })
    }

    /// Read the whole file.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// MIME type for a file extension, `application/octet-stream` when unknown.
pub fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    defaults::ACCEPTED_AUDIO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| mime.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Strip anything from a file name that could change the storage path.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Deterministic upload path for a file.
pub fn upload_path(user: &UserId, file_name: &str, unix_millis: i64) -> String {
    format!(
        "{}/{}/{}-{}",
        defaults::UPLOADS_PREFIX,
        user,
        unix_millis,
        sanitize_file_name(file_name)
    )
}

/// True when `path` lies inside the user's upload namespace.
pub fn is_owned_by(user: &UserId, path: &str) -> bool {
    let prefix = format!("{}/{}/", defaults::UPLOADS_PREFIX, user);
    path.strip_prefix(&prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/') && rest != "..")
}

/// Clamps progress to `[0, 100]` and suppresses decreasing values.
pub struct ProgressTracker {
    callback: ProgressFn,
    last: f64,
}

impl ProgressTracker {
    pub fn new(callback: ProgressFn) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    /// Report `transferred` of `total` bytes.
    pub fn report(&mut self, transferred: u64, total: u64) {
        let percent = if total == 0 {
            100.0
        } else {
            (transferred as f64 / total as f64) * 100.0
        };
        let percent = percent.clamp(0.0, 100.0);
        if percent >= self.last {
            self.last = percent;
            (self.callback)(percent);
        }
    }
}

/// Handle to a running upload.
pub struct UploadTask {
    path: String,
    token: CancellationToken,
    handle: JoinHandle<Result<(), UploadError>>,
}

impl UploadTask {
    /// Wrap a spawned transfer. Cancelling `token` must make it resolve to
    /// [`UploadError::Cancelled`].
    pub fn new(
        path: String,
        token: CancellationToken,
        handle: JoinHandle<Result<(), UploadError>>,
    ) -> Self {
        Self {
            path,
            token,
            handle,
        }
    }

    /// An upload that failed before the transfer started.
    pub fn failed(path: String, error: UploadError) -> Self {
        Self::new(
            path,
            CancellationToken::new(),
            tokio::spawn(async move { Err(error) }),
        )
    }

    /// Final storage path, known before the transfer completes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Abort the transfer. The completion then resolves to `Cancelled`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the transfer to finish.
    pub async fn wait(self) -> Result<(), UploadError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(UploadError::Cancelled),
            Err(e) => Err(UploadError::Transport {
                message: format!("upload task failed: {e}"),
            }),
        }
    }
}

/// Storage backend for uploaded audio.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start uploading `file` into the user's namespace.
    ///
    /// Returns immediately; the transfer runs in the background, reports
    /// progress through `progress` and stops when `token` is cancelled.
    fn begin_upload(
        &self,
        file: &LocalFile,
        user: &UserId,
        progress: ProgressFn,
        token: CancellationToken,
    ) -> UploadTask;

    /// Time-limited URL for reading an object owned by `user`.
    async fn signed_download_url(
        &self,
        user: &UserId,
        path: &str,
        ttl: Duration,
    ) -> Result<String, SignedUrlError>;

    /// Whether an object exists at `path`.
    async fn exists(&self, path: &str) -> bool;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "object-store"
    }
}

/// Current time in unix milliseconds.
pub(crate) fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Expiry timestamp (unix seconds) for a URL valid for `ttl`.
pub(crate) fn expiry_secs(ttl: Duration) -> i64 {
    chrono::Utc::now().timestamp() + ttl.as_secs() as i64
}

/// Appends the `expires` query parameter to an object URL.
pub(crate) fn with_expiry(mut url: url::Url, ttl: Duration) -> String {
    url.query_pairs_mut()
        .append_pair("expires", &expiry_secs(ttl).to_string());
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn upload_path_is_namespaced() {
        let path = upload_path(&user("alice"), "talk.mp3", 1_700_000_000_000);
        assert_eq!(path, "uploads/alice/1700000000000-talk.mp3");
        assert!(is_owned_by(&user("alice"), &path));
        assert!(!is_owned_by(&user("bob"), &path));
    }

    #[test]
    fn upload_path_strips_separators() {
        let path = upload_path(&user("alice"), "../../etc/passwd", 1);
        assert_eq!(path, "uploads/alice/1-_.._etc_passwd");
        assert!(is_owned_by(&user("alice"), &path));
    }

    #[test]
    fn ownership_rejects_nested_and_foreign_paths() {
        let alice = user("alice");
        assert!(!is_owned_by(&alice, "uploads/alice/"));
        assert!(!is_owned_by(&alice, "uploads/alice/x/y.mp3"));
        assert!(!is_owned_by(&alice, "uploads/alicia/y.mp3"));
        assert!(!is_owned_by(&alice, "other/alice/y.mp3"));
    }

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_file_name("meeting notes.wav"), "meeting notes.wav");
        assert_eq!(sanitize_file_name(".hidden.mp3"), "hidden.mp3");
        assert_eq!(sanitize_file_name(""), "audio");
    }

    #[test]
    fn mime_inference() {
        assert_eq!(mime_for_path(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_for_path(Path::new("a.WAV")), "audio/wav");
        assert_eq!(mime_for_path(Path::new("a.m4a")), "audio/x-m4a");
        assert_eq!(mime_for_path(Path::new("a.flac")), "audio/flac");
        assert_eq!(
            mime_for_path(Path::new("a.txt")),
            "application/octet-stream"
        );
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn local_file_open_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();

        let file = LocalFile::open(&path).unwrap();
        assert_eq!(file.name, "clip.webm");
        assert_eq!(file.size, 1234);
        assert_eq!(file.mime_type, "audio/webm");
    }

    #[test]
    fn local_file_open_missing_is_validation_error() {
        let result = LocalFile::open(Path::new("/nonexistent/scribe/clip.mp3"));
        assert!(matches!(result, Err(ValidationError::Unreadable { .. })));
    }

    #[test]
    fn progress_tracker_is_monotonic_and_clamped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut tracker = ProgressTracker::new(Box::new(move |p| sink.lock().unwrap().push(p)));

        tracker.report(50, 100);
        tracker.report(25, 100);
        tracker.report(150, 100);
        tracker.report(0, 0);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![50.0, 100.0, 100.0]);
    }
}

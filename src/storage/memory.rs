//! In-process object store for tests and dry runs.

use crate::error::{SignedUrlError, UploadError};
use crate::identity::UserId;
use crate::storage::{
    LocalFile, ObjectStore, ProgressFn, ProgressTracker, UploadTask, is_owned_by, unix_millis,
    upload_path, with_expiry,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Object store holding uploads in memory.
///
/// The transfer is split into `chunks` steps with an optional delay between
/// them so tests can cancel an upload while it is running.
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Objects,
    chunks: usize,
    chunk_delay: Option<Duration>,
    failure: Option<UploadError>,
    uploads_started: Arc<AtomicUsize>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            chunks: 4,
            chunk_delay: None,
            failure: None,
            uploads_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep between transfer steps.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Make every upload fail with `error`.
    pub fn with_failure(mut self, error: UploadError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Contents of a stored object.
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of uploads started, including failed and cancelled ones.
    pub fn uploads_started(&self) -> usize {
        self.uploads_started.load(Ordering::SeqCst)
    }
}

fn lock(objects: &Objects) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
    // A poisoned map is still consistent: every write is a single insert.
    objects.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn begin_upload(
        &self,
        file: &LocalFile,
        user: &UserId,
        progress: ProgressFn,
        token: CancellationToken,
    ) -> UploadTask {
        self.uploads_started.fetch_add(1, Ordering::SeqCst);
        let path = upload_path(user, &file.name, unix_millis());
        if !is_owned_by(user, &path) {
            return UploadTask::failed(path.clone(), UploadError::Unauthorized { path });
        }
        if let Some(error) = self.failure.clone() {
            return UploadTask::failed(path, error);
        }

        let objects = self.objects.clone();
        let source = file.path.clone();
        let chunks = self.chunks.max(1) as u64;
        let delay = self.chunk_delay;
        let task_token = token.clone();
        let key = path.clone();
        let mut tracker = ProgressTracker::new(progress);

        let handle = tokio::spawn(async move {
            let bytes = tokio::fs::read(&source)
                .await
                .map_err(|e| UploadError::Transport {
                    message: e.to_string(),
                })?;
            for step in 0..=chunks {
                if task_token.is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                tracker.report(step, chunks);
                if step < chunks
                    && let Some(delay) = delay
                {
                    tokio::select! {
                        biased;
                        _ = task_token.cancelled() => return Err(UploadError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            lock(&objects).insert(key, bytes);
            Ok(())
        });
        UploadTask::new(path, token, handle)
    }

    async fn signed_download_url(
        &self,
        user: &UserId,
        path: &str,
        ttl: Duration,
    ) -> Result<String, SignedUrlError> {
        if !is_owned_by(user, path) {
            return Err(SignedUrlError::Unauthorized {
                path: path.to_string(),
            });
        }
        if !lock(&self.objects).contains_key(path) {
            return Err(SignedUrlError::NotFound {
                path: path.to_string(),
            });
        }
        let mut url = url::Url::parse("memory://objects").map_err(|e| SignedUrlError::Transport {
            message: e.to_string(),
        })?;
        url.set_path(&format!("/{path}"));
        Ok(with_expiry(url, ttl))
    }

    async fn exists(&self, path: &str) -> bool {
        lock(&self.objects).contains_key(path)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

//! Object store backed by a bucket directory on local disk.

use crate::defaults;
use crate::error::{SignedUrlError, UploadError};
use crate::identity::UserId;
use crate::storage::{
    LocalFile, ObjectStore, ProgressFn, ProgressTracker, UploadTask, is_owned_by, unix_millis,
    upload_path, with_expiry,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Stores objects as files under `<root>/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    bucket_dir: PathBuf,
    chunk_size: usize,
}

impl FsObjectStore {
    pub fn new(root: &Path, bucket: &str) -> Self {
        Self {
            bucket_dir: root.join(bucket),
            chunk_size: defaults::UPLOAD_CHUNK_BYTES,
        }
    }

    /// Override the copy chunk size (progress granularity).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// On-disk location of an object.
    pub fn object_path(&self, path: &str) -> PathBuf {
        self.bucket_dir.join(path)
    }
}

fn transport(e: std::io::Error) -> UploadError {
    UploadError::Transport {
        message: e.to_string(),
    }
}

/// Copies `source` to `dest` through `<dest>.part`.
///
/// The part file is removed when the copy fails or is cancelled.
async fn copy_with_progress(
    source: PathBuf,
    dest: PathBuf,
    chunk_size: usize,
    progress: ProgressTracker,
    token: CancellationToken,
) -> Result<(), UploadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(transport)?;
    }

    let mut input = tokio::fs::File::open(&source).await.map_err(transport)?;
    let total = input.metadata().await.map_err(transport)?.len();
    let mut partial = dest.clone().into_os_string();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    let output = tokio::fs::File::create(&partial)
        .await
        .map_err(transport)?;

    let copied = copy_chunks(&mut input, output, total, chunk_size, progress, &token).await;
    let result = match copied {
        Ok(()) => tokio::fs::rename(&partial, &dest).await.map_err(transport),
        Err(e) => Err(e),
    };
    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(&partial).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %partial.display(), "failed to remove partial upload: {e}");
    }
    result
}

async fn copy_chunks(
    input: &mut tokio::fs::File,
    mut output: tokio::fs::File,
    total: u64,
    chunk_size: usize,
    mut progress: ProgressTracker,
    token: &CancellationToken,
) -> Result<(), UploadError> {
    let mut buf = vec![0u8; chunk_size];
    let mut transferred: u64 = 0;
    if !token.is_cancelled() {
        progress.report(0, total);
    }

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(UploadError::Cancelled),
            read = input.read(&mut buf) => read.map_err(transport)?,
        };
        if read == 0 {
            break;
        }
        output.write_all(&buf[..read]).await.map_err(transport)?;
        transferred += read as u64;
        if token.is_cancelled() {
            continue;
        }
        progress.report(transferred, total);
    }

    output.flush().await.map_err(transport)?;
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn begin_upload(
        &self,
        file: &LocalFile,
        user: &UserId,
        progress: ProgressFn,
        token: CancellationToken,
    ) -> UploadTask {
        let path = upload_path(user, &file.name, unix_millis());
        if !is_owned_by(user, &path) {
            return UploadTask::failed(path.clone(), UploadError::Unauthorized { path });
        }

        let dest = self.object_path(&path);
        let source = file.path.clone();
        let chunk_size = self.chunk_size;
        let tracker = ProgressTracker::new(progress);
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            copy_with_progress(source, dest, chunk_size, tracker, task_token).await
        });
        tracing::debug!(%path, size = file.size, "upload started");
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
        let object = self.object_path(path);
        match tokio::fs::try_exists(&object).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(SignedUrlError::NotFound {
                    path: path.to_string(),
                });
            }
            Err(e) => {
                return Err(SignedUrlError::Transport {
                    message: e.to_string(),
                });
            }
        }
        let absolute = tokio::fs::canonicalize(&object)
            .await
            .map_err(|e| SignedUrlError::Transport {
                message: e.to_string(),
            })?;
        let url = url::Url::from_file_path(&absolute).map_err(|()| SignedUrlError::Transport {
            message: format!("{} is not an absolute path", absolute.display()),
        })?;
        Ok(with_expiry(url, ttl))
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.object_path(path))
            .await
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

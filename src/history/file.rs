//! History store backed by JSON documents on local disk.
//!
//! Layout: `<root>/users/<user>/history/<id>.json`. Each write goes to a
//! temporary file that is renamed into place, so readers never see a partial
//! record.

use crate::error::PersistenceError;
use crate::history::{
    Clock, HistoryRecord, HistoryStore, HistorySubscription, Listeners, NewHistoryRecord,
    collection_path, sort_newest_first, system_clock,
};
use crate::identity::UserId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct FileHistoryStore {
    root: PathBuf,
    listeners: Listeners,
    clock: Clock,
    /// Held across a write and its snapshot publish, so snapshots go out in write order.
    writes: tokio::sync::Mutex<()>,
}

fn storage_error(context: &str, path: &Path, e: std::io::Error) -> PersistenceError {
    PersistenceError::Storage {
        message: format!("{context} {}: {e}", path.display()),
    }
}

/// Record ids are UUIDs; anything else cannot name a file in the collection.
fn validate_id(id: &str) -> Result<(), PersistenceError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| PersistenceError::NotFound { id: id.to_string() })
}

impl FileHistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listeners: Listeners::default(),
            clock: system_clock(),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Directory holding the user's records.
    pub fn collection_dir(&self, user: &UserId) -> PathBuf {
        self.root.join(collection_path(user))
    }

    fn record_path(&self, user: &UserId, id: &str) -> PathBuf {
        self.collection_dir(user).join(format!("{id}.json"))
    }

    async fn read_record(path: &Path) -> Result<HistoryRecord, PersistenceError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| storage_error("failed to read", path, e))?;
        serde_json::from_str(&contents).map_err(|e| PersistenceError::Encoding {
            message: format!("{}: {e}", path.display()),
        })
    }

    async fn read_all(&self, user: &UserId) -> Result<Vec<HistoryRecord>, PersistenceError> {
        let dir = self.collection_dir(user);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("failed to list", &dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error("failed to list", &dir, e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping unreadable history record: {e}"),
            }
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn notify(&self, user: &UserId) {
        if !self.listeners.is_watched(user) {
            return;
        }
        match self.read_all(user).await {
            Ok(snapshot) => self.listeners.publish(user, snapshot),
            Err(e) => tracing::warn!("history snapshot failed: {e}"),
        }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn create(
        &self,
        user: &UserId,
        record: NewHistoryRecord,
    ) -> Result<String, PersistenceError> {
        let id = uuid::Uuid::new_v4().to_string();
        let stored = HistoryRecord::from_new(id.clone(), (self.clock)(), record);
        let json = serde_json::to_string_pretty(&stored).map_err(|e| PersistenceError::Encoding {
            message: e.to_string(),
        })?;

        let dir = self.collection_dir(user);
        let _write = self.writes.lock().await;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error("failed to create", &dir, e))?;

        let path = self.record_path(user, &id);
        let temp = dir.join(format!(".{id}.json.tmp"));
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| storage_error("failed to write", &temp, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                tracing::warn!(path = %temp.display(), "failed to remove temp file: {cleanup}");
            }
            return Err(storage_error("failed to store", &path, e));
        }

        tracing::debug!(%id, collection = %collection_path(user), "history record created");
        self.notify(user).await;
        Ok(id)
    }

    async fn delete(&self, user: &UserId, id: &str) -> Result<(), PersistenceError> {
        validate_id(id)?;
        let path = self.record_path(user, id);
        let _write = self.writes.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(storage_error("failed to delete", &path, e)),
        }
        self.notify(user).await;
        Ok(())
    }

    async fn get(&self, user: &UserId, id: &str) -> Result<HistoryRecord, PersistenceError> {
        validate_id(id)?;
        let path = self.record_path(user, id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PersistenceError::NotFound { id: id.to_string() });
        }
        Self::read_record(&path).await
    }

    async fn list(&self, user: &UserId) -> Result<Vec<HistoryRecord>, PersistenceError> {
        self.read_all(user).await
    }

    async fn subscribe(&self, user: &UserId) -> Result<HistorySubscription, PersistenceError> {
        let snapshot = self.read_all(user).await?;
        Ok(self.listeners.subscribe(user, snapshot))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

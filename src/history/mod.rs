//! Per-user transcription history.
//!
//! Records live in the collection `users/<user>/history`. They are created
//! once and never modified; the only other mutation is deletion. Listeners
//! receive a fresh snapshot (newest first) after every change.

pub mod file;
pub mod memory;

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;

use crate::error::PersistenceError;
use crate::identity::UserId;
use crate::pipeline::types::TranscriptionOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Source of record timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub(crate) fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Collection path of a user's history.
pub fn collection_path(user: &UserId) -> String {
    format!("users/{user}/history")
}

/// A record as submitted by the pipeline, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistoryRecord {
    pub file_name: String,
    pub file_storage_path: String,
    pub transcription: String,
    pub corrected_transcription: Option<String>,
    pub summary: Option<String>,
    pub changelog: Option<String>,
    pub options: TranscriptionOptions,
}

/// A stored history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    pub file_storage_path: String,
    pub transcription: String,
    pub corrected_transcription: Option<String>,
    pub summary: Option<String>,
    pub changelog: Option<String>,
    pub options: TranscriptionOptions,
}

impl HistoryRecord {
    pub fn from_new(id: String, created_at: DateTime<Utc>, record: NewHistoryRecord) -> Self {
        Self {
            id,
            created_at,
            file_name: record.file_name,
            file_storage_path: record.file_storage_path,
            transcription: record.transcription,
            corrected_transcription: record.corrected_transcription,
            summary: record.summary,
            changelog: record.changelog,
            options: record.options,
        }
    }

    /// Corrected text when present, else the raw transcription.
    pub fn best_text(&self) -> &str {
        self.corrected_transcription
            .as_deref()
            .unwrap_or(&self.transcription)
    }
}

/// Newest first; ties broken by id so the order is stable.
pub(crate) fn sort_newest_first(records: &mut [HistoryRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Live view of a user's history.
///
/// The first call to [`next`](Self::next) yields the current snapshot; later
/// calls wait for the next change. Dropping the subscription unsubscribes.
pub struct HistorySubscription {
    rx: watch::Receiver<Vec<HistoryRecord>>,
}

impl HistorySubscription {
    /// Wait for the next snapshot. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Vec<HistoryRecord>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Per-user snapshot channels shared by the store implementations.
#[derive(Default)]
pub(crate) struct Listeners {
    senders: Mutex<HashMap<UserId, watch::Sender<Vec<HistoryRecord>>>>,
}

impl Listeners {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, watch::Sender<Vec<HistoryRecord>>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn subscribe(
        &self,
        user: &UserId,
        snapshot: Vec<HistoryRecord>,
    ) -> HistorySubscription {
        let mut senders = self.lock();
        let sender = senders
            .entry(user.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        sender.send_replace(snapshot);
        let mut rx = sender.subscribe();
        rx.mark_changed();
        HistorySubscription { rx }
    }

    /// True while at least one subscription for `user` is alive.
    pub(crate) fn is_watched(&self, user: &UserId) -> bool {
        let mut senders = self.lock();
        match senders.get(user) {
            Some(sender) if sender.receiver_count() > 0 => true,
            Some(_) => {
                senders.remove(user);
                false
            }
            None => false,
        }
    }

    pub(crate) fn publish(&self, user: &UserId, snapshot: Vec<HistoryRecord>) {
        if let Some(sender) = self.lock().get(user) {
            sender.send_replace(snapshot);
        }
    }
}

/// Durable, per-user document store for history records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store a new record. Returns the assigned id.
    async fn create(
        &self,
        user: &UserId,
        record: NewHistoryRecord,
    ) -> Result<String, PersistenceError>;

    async fn delete(&self, user: &UserId, id: &str) -> Result<(), PersistenceError>;

    async fn get(&self, user: &UserId, id: &str) -> Result<HistoryRecord, PersistenceError>;

    /// All records of the user, newest first.
    async fn list(&self, user: &UserId) -> Result<Vec<HistoryRecord>, PersistenceError>;

    /// Follow the user's collection.
    async fn subscribe(&self, user: &UserId) -> Result<HistorySubscription, PersistenceError>;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "history"
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn collection_is_namespaced_by_user() {
        let user = UserId::new("abc").unwrap();
        assert_eq!(collection_path(&user), "users/abc/history");
    }

    #[test]
    fn record_json_uses_camel_case_and_nulls() {
        let created = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let record =
            HistoryRecord::from_new("id-1".into(), created, test_support::sample("a.mp3"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fileName"], "a.mp3");
        assert_eq!(json["fileStoragePath"], "uploads/u1/1-a.mp3");
        assert_eq!(json["createdAt"], "2025-01-02T03:04:05Z");
        assert!(json["correctedTranscription"].is_null());
        assert_eq!(json["options"]["referenceFiles"][0]["size"], 2048);
    }

    #[test]
    fn sort_is_newest_first() {
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut records = vec![
            HistoryRecord::from_new("a".into(), older, test_support::sample("old.mp3")),
            HistoryRecord::from_new("b".into(), newer, test_support::sample("new.mp3")),
        ];
        sort_newest_first(&mut records);
        assert_eq!(records[0].file_name, "new.mp3");
    }

    #[tokio::test]
    async fn subscription_yields_initial_then_published_snapshots() {
        let listeners = Listeners::default();
        let user = UserId::new("u1").unwrap();
        let mut sub = listeners.subscribe(&user, Vec::new());
        assert_eq!(sub.next().await, Some(Vec::new()));

        assert!(listeners.is_watched(&user));
        let record = HistoryRecord::from_new("x".into(), Utc::now(), test_support::sample("a.mp3"));
        listeners.publish(&user, vec![record.clone()]);
        assert_eq!(sub.next().await, Some(vec![record]));
    }

    #[test]
    fn dropped_subscription_is_forgotten() {
        let listeners = Listeners::default();
        let user = UserId::new("u1").unwrap();
        drop(listeners.subscribe(&user, Vec::new()));
        assert!(!listeners.is_watched(&user));
    }
}

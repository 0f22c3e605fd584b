//! In-process history store.

use crate::error::PersistenceError;
use crate::history::{
    Clock, HistoryRecord, HistoryStore, HistorySubscription, Listeners, NewHistoryRecord,
    sort_newest_first, system_clock,
};
use crate::identity::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Collections = HashMap<UserId, Vec<HistoryRecord>>;

/// History kept in memory, used by tests and dry runs.
pub struct MemoryHistoryStore {
    collections: Mutex<Collections>,
    listeners: Listeners,
    clock: Clock,
    failure: Option<PersistenceError>,
    creates: AtomicUsize,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            listeners: Listeners::default(),
            clock: system_clock(),
            failure: None,
            creates: AtomicUsize::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Make every `create` fail with `error`.
    pub fn with_failure(mut self, error: PersistenceError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of `create` calls, failed ones included.
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self, user: &UserId) -> Vec<HistoryRecord> {
        let mut records = self.lock().get(user).cloned().unwrap_or_default();
        sort_newest_first(&mut records);
        records
    }

    fn notify(&self, user: &UserId) {
        if self.listeners.is_watched(user) {
            self.listeners.publish(user, self.snapshot(user));
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create(
        &self,
        user: &UserId,
        record: NewHistoryRecord,
    ) -> Result<String, PersistenceError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let id = uuid::Uuid::new_v4().to_string();
        let stored = HistoryRecord::from_new(id.clone(), (self.clock)(), record);
        self.lock().entry(user.clone()).or_default().push(stored);
        self.notify(user);
        Ok(id)
    }

    async fn delete(&self, user: &UserId, id: &str) -> Result<(), PersistenceError> {
        {
            let mut collections = self.lock();
            let records = collections.entry(user.clone()).or_default();
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return Err(PersistenceError::NotFound { id: id.to_string() });
            }
        }
        self.notify(user);
        Ok(())
    }

    async fn get(&self, user: &UserId, id: &str) -> Result<HistoryRecord, PersistenceError> {
        self.lock()
            .get(user)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned())
            .ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })
    }

    async fn list(&self, user: &UserId) -> Result<Vec<HistoryRecord>, PersistenceError> {
        Ok(self.snapshot(user))
    }

    async fn subscribe(&self, user: &UserId) -> Result<HistorySubscription, PersistenceError> {
        Ok(self.listeners.subscribe(user, self.snapshot(user)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

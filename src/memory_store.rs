//! An in-memory session store, geared towards testing and single-process
//! deployments.
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::store_::errors::{AllError, CommitError, DeleteError, FindError};
use crate::store_::SessionStorageBackend;

type Entries = Mutex<HashMap<String, StoreRecord>>;

#[derive(Debug)]
/// An in-memory session store.
///
/// Records live in a mutex-guarded map. A background sweeper task deletes
/// expired records on a fixed interval; [`find`](SessionStorageBackend::find)
/// additionally checks expiry on every read, so a stale record is never
/// returned between sweeps.
///
/// # Limitations
///
/// This store won't persist data between server restarts.
/// It also won't synchronize data between multiple server instances.
pub struct InMemorySessionStore {
    entries: Arc<Entries>,
    sweeper: Option<tokio::task::JoinHandle<()>>,
}

#[derive(Debug)]
struct StoreRecord {
    payload: Vec<u8>,
    expiry: OffsetDateTime,
}

impl StoreRecord {
    fn is_stale(&self) -> bool {
        self.expiry <= OffsetDateTime::now_utc()
    }
}

impl InMemorySessionStore {
    /// Creates a new (empty) in-memory session store.
    ///
    /// The sweeper runs every minute. Must be called within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_cleanup_interval(Duration::from_secs(60))
    }

    /// Creates a store whose sweeper runs on the given interval.
    ///
    /// A zero interval disables the sweeper entirely; expired records are
    /// then only dropped when a read stumbles over them or when they are
    /// overwritten. Must be called within a Tokio runtime unless the
    /// interval is zero.
    pub fn with_cleanup_interval(interval: Duration) -> Self {
        let entries = Arc::new(Mutex::new(HashMap::new()));
        let sweeper = (!interval.is_zero())
            .then(|| tokio::spawn(sweep(Arc::downgrade(&entries), interval)));
        Self { entries, sweeper }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemorySessionStore {
    fn drop(&mut self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.abort();
        }
    }
}

/// Periodically drop expired records.
///
/// The task holds only a weak reference to the entry map: once the store is
/// dropped, the next tick fails to upgrade and the task exits.
async fn sweep(entries: Weak<Entries>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(entries) = entries.upgrade() else {
            break;
        };
        let mut guard = entries.lock().await;
        guard.retain(|_, record| !record.is_stale());
    }
}

#[async_trait::async_trait]
impl SessionStorageBackend for InMemorySessionStore {
    #[tracing::instrument(name = "Find session record", level = tracing::Level::TRACE, skip_all)]
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, FindError> {
        let guard = self.entries.lock().await;
        Ok(guard
            .get(key)
            .filter(|record| !record.is_stale())
            .map(|record| record.payload.clone()))
    }

    #[tracing::instrument(name = "Commit session record", level = tracing::Level::TRACE, skip_all)]
    async fn commit(
        &self,
        key: &str,
        payload: &[u8],
        expiry: OffsetDateTime,
    ) -> Result<(), CommitError> {
        let mut guard = self.entries.lock().await;
        guard.insert(
            key.to_owned(),
            StoreRecord {
                payload: payload.to_vec(),
                expiry,
            },
        );
        Ok(())
    }

    #[tracing::instrument(name = "Delete session record", level = tracing::Level::TRACE, skip_all)]
    async fn delete(&self, key: &str) -> Result<(), DeleteError> {
        let mut guard = self.entries.lock().await;
        guard.remove(key);
        Ok(())
    }

    #[tracing::instrument(name = "Enumerate session records", level = tracing::Level::TRACE, skip_all)]
    async fn all(&self) -> Result<HashMap<String, Vec<u8>>, AllError> {
        let guard = self.entries.lock().await;
        Ok(guard
            .iter()
            .filter(|(_, record)| !record.is_stale())
            .map(|(key, record)| (key.clone(), record.payload.clone()))
            .collect())
    }
}

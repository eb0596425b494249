use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use server_session::store::errors::{AllError, CommitError, DeleteError, FindError};
use server_session::store::SessionStorageBackend;
use server_session::{
    InMemorySessionStore, JsonCodec, SessionCodec, SessionStore, SessionToken, SessionValue,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// An empty in-memory session store, without the background sweeper:
/// expiry-on-read is enough for the test suite and it keeps fixtures usable
/// from any runtime flavour.
pub fn store() -> SessionStore {
    SessionStore::new(InMemorySessionStore::with_cleanup_interval(
        std::time::Duration::ZERO,
    ))
}

/// An empty in-memory session store, with a mechanism to inspect
/// what calls were made to it.
pub fn spy_store() -> (SessionStore, CallTracker) {
    let backend = InMemorySessionStore::with_cleanup_interval(std::time::Duration::ZERO);
    let spy_backend = SpyBackend::new(backend);
    let call_tracker = spy_backend.call_tracker();
    (SessionStore::new(spy_backend), call_tracker)
}

/// A store whose backend fails every operation.
pub fn broken_store() -> SessionStore {
    SessionStore::new(BrokenBackend)
}

/// A working store that cannot enumerate its records.
pub fn no_iteration_store() -> SessionStore {
    SessionStore::new(NoIterationBackend(
        InMemorySessionStore::with_cleanup_interval(std::time::Duration::ZERO),
    ))
}

/// A helper to seed the store with a pre-existing session record.
pub struct SessionFixture {
    pub token: String,
    pub values: HashMap<String, SessionValue>,
    /// The deadline baked into the encoded payload.
    pub deadline: OffsetDateTime,
    /// The expiry hint handed to the store. Defaults to `deadline`.
    pub store_expiry: Option<OffsetDateTime>,
}

impl Default for SessionFixture {
    fn default() -> Self {
        Self {
            token: SessionToken::random().unwrap().as_str().to_owned(),
            values: HashMap::new(),
            // High enough to survive the whole test suite.
            deadline: OffsetDateTime::now_utc() + time::Duration::seconds(1000),
            store_expiry: None,
        }
    }
}

impl SessionFixture {
    /// Encode and commit the record, returning the token to present on the
    /// next load.
    pub async fn setup(&self, store: &SessionStore) -> String {
        let payload = JsonCodec
            .encode(self.deadline, &self.values)
            .expect("Failed to encode session fixture");
        store
            .commit(
                &self.token,
                &payload,
                self.store_expiry.unwrap_or(self.deadline),
            )
            .await
            .expect("Failed to seed the store with the session fixture");
        self.token.clone()
    }
}

/// A wrapper that keeps track of which methods have been called
/// on the underlying session storage backend.
#[derive(Debug)]
pub struct SpyBackend<B> {
    backend: B,
    call_tracker: CallTracker,
}

impl<B> SpyBackend<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            call_tracker: Default::default(),
        }
    }

    pub fn call_tracker(&self) -> CallTracker {
        self.call_tracker.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallTracker(Arc<Mutex<Vec<String>>>);

impl CallTracker {
    pub async fn assert_store_was_untouched(&self) {
        let oplog = self.0.lock().await;
        assert!(
            oplog.is_empty(),
            "The store was supposed to be untouched, but at least one method has been called on it. Operation log:\n  - {}",
            oplog.join("\n  - ")
        )
    }

    pub async fn operation_log(&self) -> Vec<String> {
        self.0.lock().await.clone()
    }

    pub async fn reset_operation_log(&self) {
        self.0.lock().await.clear();
    }

    async fn push_operation(&self, op: impl Into<String>) {
        self.0.lock().await.push(op.into());
    }
}

#[async_trait::async_trait]
impl<B: SessionStorageBackend> SessionStorageBackend for SpyBackend<B> {
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, FindError> {
        self.call_tracker.push_operation(format!("find {key}")).await;
        self.backend.find(key).await
    }

    async fn commit(
        &self,
        key: &str,
        payload: &[u8],
        expiry: OffsetDateTime,
    ) -> Result<(), CommitError> {
        self.call_tracker
            .push_operation(format!("commit {key}"))
            .await;
        self.backend.commit(key, payload, expiry).await
    }

    async fn delete(&self, key: &str) -> Result<(), DeleteError> {
        self.call_tracker
            .push_operation(format!("delete {key}"))
            .await;
        self.backend.delete(key).await
    }

    async fn all(&self) -> Result<HashMap<String, Vec<u8>>, AllError> {
        self.call_tracker.push_operation("all").await;
        self.backend.all().await
    }
}

#[derive(Debug)]
struct BrokenBackend;

#[async_trait::async_trait]
impl SessionStorageBackend for BrokenBackend {
    async fn find(&self, _key: &str) -> Result<Option<Vec<u8>>, FindError> {
        Err(FindError::Other(anyhow!("the store is down")))
    }

    async fn commit(
        &self,
        _key: &str,
        _payload: &[u8],
        _expiry: OffsetDateTime,
    ) -> Result<(), CommitError> {
        Err(CommitError::Other(anyhow!("the store is down")))
    }

    async fn delete(&self, _key: &str) -> Result<(), DeleteError> {
        Err(DeleteError::Other(anyhow!("the store is down")))
    }
}

/// Delegates everything except `all`, which stays at the trait's
/// unsupported default.
#[derive(Debug)]
struct NoIterationBackend(InMemorySessionStore);

#[async_trait::async_trait]
impl SessionStorageBackend for NoIterationBackend {
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, FindError> {
        self.0.find(key).await
    }

    async fn commit(
        &self,
        key: &str,
        payload: &[u8],
        expiry: OffsetDateTime,
    ) -> Result<(), CommitError> {
        self.0.commit(key, payload, expiry).await
    }

    async fn delete(&self, key: &str) -> Result<(), DeleteError> {
        self.0.delete(key).await
    }
}

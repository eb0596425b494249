use std::collections::HashMap;
use std::sync::Arc;

use errors::{AllError, CommitError, DeleteError, FindError, IterationUnsupportedError};
use time::OffsetDateTime;

/// Where server-side session records are stored.
///
/// It is a thin wrapper
/// [around your chosen storage backend implementation][`SessionStorageBackend`],
/// removing the need to specify the concrete type of the storage backend
/// everywhere in your code.
#[derive(Debug, Clone)]
pub struct SessionStore(Arc<dyn SessionStorageBackend>);

impl SessionStore {
    /// Creates a new session store using the provided backend.
    pub fn new<Backend>(backend: Backend) -> Self
    where
        Backend: SessionStorageBackend + 'static,
    {
        Self(Arc::new(backend))
    }

    /// Looks up the payload stored under `key`.
    ///
    /// Returns `None` when there is no record, or when the record's expiry
    /// is at or before now.
    pub async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, FindError> {
        self.0.find(key).await
    }

    /// Writes `payload` under `key` with the given expiry hint.
    ///
    /// Overwrites any existing record for the same key.
    pub async fn commit(
        &self,
        key: &str,
        payload: &[u8],
        expiry: OffsetDateTime,
    ) -> Result<(), CommitError> {
        self.0.commit(key, payload, expiry).await
    }

    /// Deletes the record stored under `key`.
    ///
    /// Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), DeleteError> {
        self.0.delete(key).await
    }

    /// Returns a snapshot of every live record in the store, keyed by
    /// store key.
    ///
    /// Backends that cannot enumerate their records report
    /// [`AllError::Unsupported`].
    pub async fn all(&self) -> Result<HashMap<String, Vec<u8>>, AllError> {
        self.0.all().await
    }
}

#[async_trait::async_trait]
/// The interface of a session storage backend.
///
/// A backend maps store keys (tokens, or their hashes) to encoded session
/// payloads with an expiry hint. It is responsible for its own internal
/// concurrency: methods may be called from arbitrary tasks at once.
pub trait SessionStorageBackend: std::fmt::Debug + Send + Sync {
    /// Looks up the payload stored under `key`.
    ///
    /// Must return `Ok(None)` for records whose expiry is at or before now,
    /// even if the backend has not physically removed them yet.
    async fn find(&self, key: &str) -> Result<Option<Vec<u8>>, FindError>;

    /// Writes `payload` under `key` with the given expiry hint.
    ///
    /// This is an upsert: overwriting an existing record is mandatory.
    /// A backend enforcing key uniqueness across a cluster may instead
    /// report [`CommitError::DuplicateKey`] for a conflicting insert.
    async fn commit(
        &self,
        key: &str,
        payload: &[u8],
        expiry: OffsetDateTime,
    ) -> Result<(), CommitError>;

    /// Deletes the record stored under `key`.
    ///
    /// Must be idempotent: deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), DeleteError>;

    /// Returns a snapshot of every live record in the store.
    ///
    /// Optional capability, used by
    /// [`SessionManager::iterate`](crate::SessionManager::iterate).
    async fn all(&self) -> Result<HashMap<String, Vec<u8>>, AllError> {
        Err(IterationUnsupportedError.into())
    }
}

/// Errors that can occur when interacting with a session storage backend.
pub mod errors {
    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::find`][super::SessionStorageBackend::find].
    pub enum FindError {
        /// Something went wrong when looking up the session record.
        #[error("Something went wrong when looking up the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::commit`][super::SessionStorageBackend::commit].
    pub enum CommitError {
        #[error(transparent)]
        /// A record with the same key already exists and the backend refused
        /// to overwrite it.
        DuplicateKey(#[from] DuplicateKeyError),
        /// Something else went wrong when writing the session record.
        #[error("Something went wrong when writing the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::delete`][super::SessionStorageBackend::delete].
    pub enum DeleteError {
        /// Something went wrong when deleting the session record.
        #[error("Something went wrong when deleting the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::all`][super::SessionStorageBackend::all].
    pub enum AllError {
        #[error(transparent)]
        /// The backend cannot enumerate its records.
        Unsupported(#[from] IterationUnsupportedError),
        /// Something else went wrong when enumerating the session records.
        #[error("Something went wrong when enumerating the session records.")]
        Other(#[source] anyhow::Error),
    }

    #[derive(Debug, thiserror::Error)]
    #[error("The session store does not support iteration")]
    /// The backend cannot enumerate its records.
    pub struct IterationUnsupportedError;

    #[derive(Debug, thiserror::Error)]
    #[error("A session record with the same key already exists.")]
    /// A record with the same key already exists.
    pub struct DuplicateKeyError {
        /// The conflicting store key.
        pub key: String,
    }
}

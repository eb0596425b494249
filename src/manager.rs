use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use http::Extensions;
use time::OffsetDateTime;

use crate::codec::{JsonCodec, SessionCodec};
use crate::manager::errors::{
    CommitError, DestroyError, IterateError, MergeError, RenewTokenError,
};
use crate::middleware::{default_error_handler, ErrorHandler, LoadAndSaveLayer};
use crate::session_::Session;
use crate::store_::{errors as store_errors, SessionStore};
use crate::token::{self, SessionToken};
use crate::SessionConfig;
use crate::SessionStatus;

/// The public entry point for session management.
///
/// A manager bundles the storage backend, the codec, and the configuration,
/// and orchestrates the session lifecycle around them: loading a session
/// from a token, committing it back, renewing, destroying, iterating.
///
/// Managers are cheap to clone and safe to share across tasks; clones refer
/// to the same configuration and store. Configuration is read-only after
/// construction.
///
/// Most applications interact with sessions through the
/// [`load_and_save`](Self::load_and_save) middleware plus the
/// [`Session`] handle it attaches to each request; the lifecycle methods
/// here are for handlers that need explicit control (logout, privilege
/// change, maintenance jobs).
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: SessionConfig,
    store: SessionStore,
    codec: Box<dyn SessionCodec>,
    error_handler: ErrorHandler,
    key: ManagerKey,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.inner.config)
            .field("store", &self.inner.store)
            .field("codec", &self.inner.codec)
            .finish()
    }
}

/// A process-unique sentinel distinguishing one manager's request-attached
/// session from another's, so multiple managers can coexist on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ManagerKey(u64);

impl ManagerKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The sessions attached to a request, one per manager.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttachedSessions(Vec<(ManagerKey, Session)>);

impl AttachedSessions {
    fn get(&self, key: ManagerKey) -> Option<Session> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, session)| session.clone())
    }

    fn insert(&mut self, key: ManagerKey, session: Session) {
        self.0.retain(|(k, _)| *k != key);
        self.0.push((key, session));
    }
}

/// Incrementally construct a [`SessionManager`].
///
/// Obtained via [`SessionManager::builder`].
pub struct SessionManagerBuilder {
    store: SessionStore,
    config: SessionConfig,
    codec: Box<dyn SessionCodec>,
    error_handler: ErrorHandler,
}

impl SessionManagerBuilder {
    /// Replace the default configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`JsonCodec`].
    pub fn codec<Codec>(mut self, codec: Codec) -> Self
    where
        Codec: SessionCodec + 'static,
    {
        self.codec = Box::new(codec);
        self
    }

    /// Replace the hook invoked when the middleware fails to write the
    /// session back.
    ///
    /// The default logs the error and responds with a plain 500.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&crate::middleware::FinalizeError) -> http::StatusCode + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Finish construction.
    pub fn build(self) -> SessionManager {
        SessionManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                store: self.store,
                codec: self.codec,
                error_handler: self.error_handler,
                key: ManagerKey::next(),
            }),
        }
    }
}

impl SessionManager {
    /// A manager with the default configuration and codec.
    pub fn new(store: SessionStore) -> Self {
        Self::builder(store).build()
    }

    /// Start building a manager on top of the given store.
    pub fn builder(store: SessionStore) -> SessionManagerBuilder {
        SessionManagerBuilder {
            store,
            config: SessionConfig::default(),
            codec: Box::new(JsonCodec),
            error_handler: default_error_handler(),
        }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The middleware wrapping downstream handlers in the session
    /// lifecycle.
    ///
    /// The middleware loads the session named by the request cookie,
    /// attaches it to the request, and writes the session (and the
    /// `Set-Cookie` header) back once the downstream handler completes.
    /// It can be installed multiple times with distinct managers, as long
    /// as their cookie names differ.
    pub fn load_and_save(&self) -> LoadAndSaveLayer {
        LoadAndSaveLayer::new(self.clone())
    }
}

/// Session lifecycle operations.
impl SessionManager {
    /// A brand-new session: no token, empty state, status unmodified,
    /// deadline a full lifetime away.
    pub fn new_session(&self) -> Session {
        Session::fresh(self.inner.config.state.lifetime)
    }

    /// Load the session identified by `token`.
    ///
    /// A missing, unknown, expired, or undecodable token yields a fresh
    /// session rather than an error: read-side failures never take the
    /// request down, they only cost the client its state.
    ///
    /// When an idle timeout is configured, a successful load restarts the
    /// idle window: read-only requests count as activity.
    pub async fn load(&self, token: Option<&str>) -> Session {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return self.new_session();
        };
        let payload = match self.inner.store.find(&self.store_key(token)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return self.new_session(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to look up the session record, starting a fresh session."
                );
                return self.new_session();
            }
        };
        let decoded = match self.inner.codec.decode(&payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Corrupt session payload, starting a fresh session."
                );
                return self.new_session();
            }
        };
        if decoded.deadline <= OffsetDateTime::now_utc() {
            return self.new_session();
        }
        // Any request bearing the token counts as activity: re-file the
        // record so the idle window restarts. Best-effort, like the rest of
        // the read path.
        if self.inner.config.state.idle_timeout.is_some() {
            let expiry = self.effective_expiry(decoded.deadline);
            if let Err(e) = self
                .inner
                .store
                .commit(&self.store_key(token), &payload, expiry)
                .await
            {
                tracing::warn!(
                    error = %e,
                    "Failed to refresh the idle expiry of the session record."
                );
            }
        }
        Session::from_parts(SessionToken::from(token), decoded.deadline, decoded.values)
    }

    /// Retrieve the session the middleware attached to the request.
    ///
    /// When no session is attached—e.g. in tests exercising a handler
    /// without the middleware—a fresh detached session is returned instead.
    pub fn session(&self, extensions: &Extensions) -> Session {
        extensions
            .get::<AttachedSessions>()
            .and_then(|attached| attached.get(self.inner.key))
            .unwrap_or_else(|| self.new_session())
    }

    /// Write the session record to the store.
    ///
    /// A session that has never been persisted is assigned a token first.
    /// The record's expiry hint is the session deadline, tightened to
    /// `now + idle_timeout` when an idle timeout is configured. Returns the
    /// token and the expiry that went to the store.
    ///
    /// The middleware calls this on the response path for modified
    /// sessions; calling it again without intervening mutations rewrites an
    /// identical record.
    pub async fn commit(
        &self,
        session: &Session,
    ) -> Result<(SessionToken, OffsetDateTime), CommitError> {
        let (existing, deadline, values) = session.export();
        let payload = self.inner.codec.encode(deadline, &values)?;
        let expiry = self.effective_expiry(deadline);

        let was_fresh = existing.is_none();
        let mut token = match existing {
            Some(token) => token,
            None => SessionToken::random()?,
        };
        let mut retried = false;
        loop {
            let outcome = self
                .inner
                .store
                .commit(&self.store_key(token.as_str()), &payload, expiry)
                .await;
            match outcome {
                Ok(()) => break,
                // A freshly drawn token collided. One more draw settles it;
                // a second collision means the backend is lying to us.
                Err(store_errors::CommitError::DuplicateKey(_)) if was_fresh && !retried => {
                    retried = true;
                    token = SessionToken::random()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        session.set_token(token.clone());
        Ok((token, expiry))
    }

    /// Destroy the session: delete its record from the store and mark it
    /// terminally dead.
    ///
    /// The middleware will instruct the client to discard its cookie on the
    /// response path. Unlike [`Session::destroy`], the record is gone from
    /// the store before this method returns, so destruction survives even a
    /// client that disconnects mid-response.
    pub async fn destroy(&self, session: &Session) -> Result<(), DestroyError> {
        if let Some(token) = session.token() {
            self.inner
                .store
                .delete(&self.store_key(token.as_str()))
                .await?;
        }
        session.destroy();
        Ok(())
    }

    /// Discard the session's token and schedule it for re-issue under a
    /// fresh one. The values and the deadline are preserved.
    ///
    /// Call this on any privilege change (login, role escalation): the old
    /// token is deleted from the store immediately, so a fixated token in
    /// an attacker's hands now names nothing and a request bearing it
    /// starts over with an empty session.
    pub async fn renew_token(&self, session: &Session) -> Result<(), RenewTokenError> {
        if let Some(old) = session.renew() {
            self.inner
                .store
                .delete(&self.store_key(old.as_str()))
                .await?;
        }
        Ok(())
    }

    /// Merge the state stored under `token` into `session`.
    ///
    /// Incoming values overwrite current ones on key conflict; the later of
    /// the two deadlines is kept; the merged-in record is deleted from the
    /// store. Merging a session into itself, or from a missing or expired
    /// token, is a no-op.
    ///
    /// Useful when a strict-same-site token is lost across an OAuth-style
    /// redirect and the interim session needs to be folded back in.
    pub async fn merge_session(&self, session: &Session, token: &str) -> Result<(), MergeError> {
        if session.token().as_ref().map(SessionToken::as_str) == Some(token) {
            return Ok(());
        }
        let key = self.store_key(token);
        let Some(payload) = self.inner.store.find(&key).await? else {
            return Ok(());
        };
        let decoded = self.inner.codec.decode(&payload)?;
        if decoded.deadline <= OffsetDateTime::now_utc() {
            return Ok(());
        }
        session.merge(decoded.deadline, decoded.values);
        self.inner.store.delete(&key).await?;
        Ok(())
    }

    /// Run `f` over every session in the store.
    ///
    /// Requires a store that supports enumeration. Each record is decoded
    /// into a transient [`Session`]; mutations made by `f` are written back
    /// (or the record deleted, for destroyed sessions) before the next
    /// record is visited. Iteration halts on the first error, whether from
    /// `f` or from the store.
    ///
    /// The snapshot is taken when iteration starts: records created
    /// concurrently may be missed.
    pub async fn iterate<F>(&self, mut f: F) -> Result<(), IterateError>
    where
        F: FnMut(&Session) -> Result<(), anyhow::Error>,
    {
        let records = self.inner.store.all().await?;
        for (key, payload) in records {
            let decoded = self.inner.codec.decode(&payload)?;
            let session = Session::from_parts(
                SessionToken::from(key.clone()),
                decoded.deadline,
                decoded.values,
            );
            f(&session).map_err(IterateError::Callback)?;
            // Records are addressed by store key here: when token hashing is
            // enabled the original tokens are unrecoverable, so the write-back
            // must not go through `commit`.
            match session.status() {
                SessionStatus::Modified => {
                    let (_, deadline, values) = session.export();
                    let payload = self.inner.codec.encode(deadline, &values)?;
                    self.inner
                        .store
                        .commit(&key, &payload, self.effective_expiry(deadline))
                        .await
                        .map_err(IterateError::Commit)?;
                }
                SessionStatus::Destroyed => {
                    self.inner
                        .store
                        .delete(&key)
                        .await
                        .map_err(IterateError::Delete)?;
                }
                SessionStatus::Unmodified => {}
            }
        }
        Ok(())
    }
}

/// Crate-internal hooks used by the middleware.
impl SessionManager {
    pub(crate) fn cookie_name(&self) -> &str {
        &self.inner.config.cookie.name
    }

    pub(crate) fn error_handler(&self) -> &ErrorHandler {
        &self.inner.error_handler
    }

    pub(crate) fn attach(&self, extensions: &mut Extensions, session: Session) {
        if let Some(attached) = extensions.get_mut::<AttachedSessions>() {
            attached.insert(self.inner.key, session);
        } else {
            let mut attached = AttachedSessions::default();
            attached.insert(self.inner.key, session);
            extensions.insert(attached);
        }
    }

    pub(crate) async fn delete_record(&self, token: &str) -> Result<(), store_errors::DeleteError> {
        self.inner.store.delete(&self.store_key(token)).await
    }

    fn effective_expiry(&self, deadline: OffsetDateTime) -> OffsetDateTime {
        match self.inner.config.state.idle_timeout {
            Some(idle) if !idle.is_zero() => deadline.min(OffsetDateTime::now_utc() + idle),
            _ => deadline,
        }
    }

    fn store_key(&self, token: &str) -> String {
        if self.inner.config.state.hash_token_in_store {
            token::hashed(token)
        } else {
            token.to_owned()
        }
    }
}

/// Errors that can occur when orchestrating the session lifecycle.
pub mod errors {
    use crate::store_::errors as store_errors;

    pub use crate::codec::{DecodeError, EncodeError};
    pub use crate::token::TokenGenerationError;

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`SessionManager::commit`][super::SessionManager::commit].
    pub enum CommitError {
        #[error(transparent)]
        TokenGeneration(#[from] TokenGenerationError),
        #[error(transparent)]
        Encode(#[from] EncodeError),
        #[error("Failed to write the session record to the store")]
        Store(#[from] store_errors::CommitError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`SessionManager::destroy`][super::SessionManager::destroy].
    pub enum DestroyError {
        #[error("Failed to delete the session record from the store")]
        Store(#[from] store_errors::DeleteError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`SessionManager::renew_token`][super::SessionManager::renew_token].
    pub enum RenewTokenError {
        #[error("Failed to delete the previous session record from the store")]
        Store(#[from] store_errors::DeleteError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`SessionManager::merge_session`][super::SessionManager::merge_session].
    pub enum MergeError {
        #[error("Failed to look up the session record to merge")]
        Find(#[from] store_errors::FindError),
        #[error(transparent)]
        Decode(#[from] DecodeError),
        #[error("Failed to delete the merged session record from the store")]
        Delete(#[from] store_errors::DeleteError),
    }

    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    /// The error returned by [`SessionManager::iterate`][super::SessionManager::iterate].
    pub enum IterateError {
        #[error(transparent)]
        /// The store cannot enumerate its records.
        Unsupported(store_errors::IterationUnsupportedError),
        #[error("Failed to enumerate the session store")]
        Store(#[source] store_errors::AllError),
        #[error(transparent)]
        Decode(#[from] DecodeError),
        #[error(transparent)]
        Encode(#[from] EncodeError),
        #[error("Failed to write back a session record during iteration")]
        Commit(#[source] store_errors::CommitError),
        #[error("Failed to delete a session record during iteration")]
        Delete(#[source] store_errors::DeleteError),
        #[error("The iteration callback failed")]
        Callback(#[source] anyhow::Error),
    }

    impl From<store_errors::AllError> for IterateError {
        fn from(e: store_errors::AllError) -> Self {
            match e {
                store_errors::AllError::Unsupported(e) => Self::Unsupported(e),
                other => Self::Store(other),
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use time::OffsetDateTime;

use crate::token::SessionToken;
use crate::value::{SessionValue, State};

/// The reserved key holding the per-session remember-me override.
///
/// Stored in the values map so the override survives commit/load round
/// trips, like any other session value.
pub(crate) const REMEMBER_ME_KEY: &str = "__remember_me";

/// The current HTTP session.
///
/// A `Session` is a cheap handle: cloning it yields another handle to the
/// same underlying state, which is what the middleware attaches to the
/// request and what handlers mutate. All accessors lock the per-session
/// mutex for the duration of the call, so a handler may hand clones to
/// helper tasks within the request.
///
/// Reads never change the modification status; every mutation marks the
/// session as modified so the middleware knows to write it back on the
/// response path.
#[derive(Clone)]
pub struct Session {
    data: Arc<Mutex<SessionData>>,
}

#[derive(Debug)]
struct SessionData {
    /// `None` until the session is first committed.
    token: Option<SessionToken>,
    /// The absolute instant at which the session expires regardless of
    /// activity. Fixed at creation; only merging can move it.
    deadline: OffsetDateTime,
    status: SessionStatus,
    values: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Where a session sits in its write-back lifecycle.
pub enum SessionStatus {
    /// No changes since load. The middleware leaves the store and the
    /// client untouched.
    #[default]
    Unmodified,
    /// At least one mutation. The middleware commits the record and sends
    /// a session cookie.
    Modified,
    /// Terminal for the request. The middleware deletes the record and
    /// sends an expiring cookie; later mutations update the in-memory map
    /// but cannot resurrect the session.
    Destroyed,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.lock();
        f.debug_struct("Session")
            .field("token", &"**redacted**")
            .field("deadline", &data.deadline)
            .field("status", &data.status)
            .field("values", &data.values)
            .finish()
    }
}

impl Session {
    /// A brand-new session: no token, empty state, full lifetime ahead.
    pub(crate) fn fresh(lifetime: Duration) -> Self {
        Self {
            data: Arc::new(Mutex::new(SessionData {
                token: None,
                deadline: OffsetDateTime::now_utc() + lifetime,
                status: SessionStatus::Unmodified,
                values: HashMap::new(),
            })),
        }
    }

    /// A continuation of a stored session.
    pub(crate) fn from_parts(
        token: SessionToken,
        deadline: OffsetDateTime,
        values: State,
    ) -> Self {
        Self {
            data: Arc::new(Mutex::new(SessionData {
                token: Some(token),
                deadline,
                status: SessionStatus::Unmodified,
                values,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Read operations. None of these change the modification status.
impl Session {
    /// Get the value associated with `key`.
    pub fn get(&self, key: &str) -> Option<SessionValue> {
        self.lock().values.get(key).cloned()
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    /// A sorted snapshot of the keys currently in the session.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The session's write-back status.
    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    /// The token identifying this session, if it has ever been committed.
    pub fn token(&self) -> Option<SessionToken> {
        self.lock().token.clone()
    }

    /// The absolute instant at which the session expires.
    pub fn deadline(&self) -> OffsetDateTime {
        self.lock().deadline
    }
}

/// Mutation operations. Each marks the session as modified, unless it has
/// already been destroyed.
impl Session {
    /// Store `value` under `key`, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, value: impl Into<SessionValue>) {
        let mut data = self.lock();
        data.values.insert(key.into(), value.into());
        data.touch();
    }

    /// Remove and return the value stored under `key`.
    pub fn pop(&self, key: &str) -> Option<SessionValue> {
        let mut data = self.lock();
        let value = data.values.remove(key);
        if value.is_some() {
            data.touch();
        }
        value
    }

    /// Remove the value stored under `key`, if any.
    pub fn remove(&self, key: &str) {
        let mut data = self.lock();
        if data.values.remove(key).is_some() {
            data.touch();
        }
    }

    /// Remove every value from the session.
    ///
    /// The session itself stays alive: the token and deadline are untouched.
    pub fn clear(&self) {
        let mut data = self.lock();
        if !data.values.is_empty() {
            data.values.clear();
            data.touch();
        }
    }

    /// Mark the session as destroyed and drop its values.
    ///
    /// On the response path the middleware will delete the stored record and
    /// instruct the client to discard its cookie. Prefer
    /// [`SessionManager::destroy`](crate::SessionManager::destroy) when you
    /// want the record gone from the store immediately.
    pub fn destroy(&self) {
        let mut data = self.lock();
        data.status = SessionStatus::Destroyed;
        data.values.clear();
    }

    /// Override, for this session only, whether the cookie outlives the
    /// browser session.
    ///
    /// `true` forces `Max-Age`/`Expires` onto the next session cookie;
    /// `false` omits them. Without an override, the manager-wide
    /// [`persist`](crate::config::SessionCookieConfig::persist) setting
    /// applies.
    pub fn remember_me(&self, remember: bool) {
        self.put(REMEMBER_ME_KEY, remember);
    }
}

/// Typed accessors.
///
/// Each returns the zero value of the requested type when the key is absent
/// or holds a different type; they never error. Use [`get`](Self::get) when
/// you need to distinguish "absent" from "zero".
impl Session {
    /// The string stored under `key`, or `""`.
    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(SessionValue::String(value)) => value,
            _ => String::new(),
        }
    }

    /// The integer stored under `key`, or `0`.
    pub fn get_int(&self, key: &str) -> i64 {
        match self.get(key) {
            Some(SessionValue::Int(value)) => value,
            _ => 0,
        }
    }

    /// The float stored under `key`, or `0.0`.
    pub fn get_float(&self, key: &str) -> f64 {
        match self.get(key) {
            Some(SessionValue::Float(value)) => value,
            _ => 0.0,
        }
    }

    /// The boolean stored under `key`, or `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(SessionValue::Bool(true)))
    }

    /// The instant stored under `key`, or the Unix epoch.
    pub fn get_time(&self, key: &str) -> OffsetDateTime {
        match self.get(key) {
            Some(SessionValue::Time(value)) => value,
            _ => OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// The byte string stored under `key`, or an empty one.
    pub fn get_bytes(&self, key: &str) -> Vec<u8> {
        match self.get(key) {
            Some(SessionValue::Bytes(value)) => value,
            _ => Vec::new(),
        }
    }

    /// Remove and return the string stored under `key`, or `""`.
    pub fn pop_string(&self, key: &str) -> String {
        match self.pop(key) {
            Some(SessionValue::String(value)) => value,
            _ => String::new(),
        }
    }

    /// Remove and return the integer stored under `key`, or `0`.
    pub fn pop_int(&self, key: &str) -> i64 {
        match self.pop(key) {
            Some(SessionValue::Int(value)) => value,
            _ => 0,
        }
    }

    /// Remove and return the float stored under `key`, or `0.0`.
    pub fn pop_float(&self, key: &str) -> f64 {
        match self.pop(key) {
            Some(SessionValue::Float(value)) => value,
            _ => 0.0,
        }
    }

    /// Remove and return the boolean stored under `key`, or `false`.
    pub fn pop_bool(&self, key: &str) -> bool {
        matches!(self.pop(key), Some(SessionValue::Bool(true)))
    }

    /// Remove and return the instant stored under `key`, or the Unix epoch.
    pub fn pop_time(&self, key: &str) -> OffsetDateTime {
        match self.pop(key) {
            Some(SessionValue::Time(value)) => value,
            _ => OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// Remove and return the byte string stored under `key`, or an empty one.
    pub fn pop_bytes(&self, key: &str) -> Vec<u8> {
        match self.pop(key) {
            Some(SessionValue::Bytes(value)) => value,
            _ => Vec::new(),
        }
    }
}

/// Crate-internal hooks used by the manager and the middleware.
impl Session {
    /// Atomic snapshot of everything a commit needs.
    pub(crate) fn export(&self) -> (Option<SessionToken>, OffsetDateTime, State) {
        let data = self.lock();
        (data.token.clone(), data.deadline, data.values.clone())
    }

    pub(crate) fn set_token(&self, token: SessionToken) {
        self.lock().token = Some(token);
    }

    /// Detach the current token ahead of a renewal.
    ///
    /// The values and the deadline stay; the session is marked modified so
    /// the middleware commits it under a fresh token.
    pub(crate) fn renew(&self) -> Option<SessionToken> {
        let mut data = self.lock();
        let old = data.token.take();
        data.touch();
        old
    }

    /// Fold another session's state into this one.
    ///
    /// Incoming values win on key conflict; the later deadline is kept.
    pub(crate) fn merge(&self, deadline: OffsetDateTime, values: State) {
        let mut data = self.lock();
        if deadline > data.deadline {
            data.deadline = deadline;
        }
        data.values.extend(values);
        data.touch();
    }

    /// Whether the next cookie should carry `Max-Age`/`Expires`, honouring
    /// the per-session remember-me override when present.
    pub(crate) fn effective_persist(&self, default: bool) -> bool {
        match self.get(REMEMBER_ME_KEY) {
            Some(SessionValue::Bool(remember)) => remember,
            _ => default,
        }
    }
}

impl SessionData {
    fn touch(&mut self) {
        if self.status != SessionStatus::Destroyed {
            self.status = SessionStatus::Modified;
        }
    }
}

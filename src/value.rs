use std::collections::HashMap;

use time::OffsetDateTime;

/// A convenient alias for the shape of the session state.
pub(crate) type State = HashMap<String, SessionValue>;

/// A single scalar stored in the session state.
///
/// The session state is a bag of loosely-typed values: handlers routinely
/// stash a user id next to a flash message next to a timestamp. Rather than
/// forcing a single concrete type on the whole map, each entry is one of a
/// small set of scalars, and the typed accessors on
/// [`Session`](crate::Session) recover the concrete type on the way out.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SessionValue {
    /// An explicit "nothing" value, distinct from an absent key.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// An absolute instant, e.g. "last seen at".
    Time(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SessionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SessionValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for SessionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for SessionValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<OffsetDateTime> for SessionValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Time(value)
    }
}

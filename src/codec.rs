use std::borrow::Cow;
use std::collections::HashMap;

use time::OffsetDateTime;

use crate::value::SessionValue;

/// Converts the in-memory session state to and from the opaque byte blob
/// persisted by the storage backend.
///
/// The default codec is [`JsonCodec`]. Swap in your own implementation if
/// you need a different wire format (e.g. a binary one): the rest of the
/// crate only ever sees bytes.
pub trait SessionCodec: std::fmt::Debug + Send + Sync {
    /// Serialize the session deadline and values into a payload suitable
    /// for store persistence.
    fn encode(
        &self,
        deadline: OffsetDateTime,
        values: &HashMap<String, SessionValue>,
    ) -> Result<Vec<u8>, EncodeError>;

    /// Deserialize a stored payload.
    ///
    /// Malformed input must fail with a [`DecodeError`] rather than produce
    /// a partial session.
    fn decode(&self, payload: &[u8]) -> Result<DecodedSession, DecodeError>;
}

/// The outcome of decoding a stored payload.
#[derive(Debug)]
pub struct DecodedSession {
    /// The absolute instant at which the session expires.
    pub deadline: OffsetDateTime,
    /// The set of key-value pairs attached to the session.
    pub values: HashMap<String, SessionValue>,
}

#[derive(serde::Serialize, serde::Deserialize)]
/// The schema for the stored session payload.
///
/// We rename field names to numbers to minimise the size of the payload.
struct WireRecord<'a> {
    #[serde(rename = "0", with = "time::serde::rfc3339")]
    deadline: OffsetDateTime,
    #[serde(rename = "1", skip_serializing_if = "HashMap::is_empty", default)]
    values: Cow<'a, HashMap<String, SessionValue>>,
}

#[derive(Debug, Clone, Copy, Default)]
/// The default codec: JSON via `serde_json`.
///
/// Every [`SessionValue`] scalar survives a round trip unchanged. The raw
/// bytes are deterministic only up to map ordering, so equality checks
/// should compare decoded content, not encoded payloads.
pub struct JsonCodec;

impl SessionCodec for JsonCodec {
    fn encode(
        &self,
        deadline: OffsetDateTime,
        values: &HashMap<String, SessionValue>,
    ) -> Result<Vec<u8>, EncodeError> {
        let record = WireRecord {
            deadline,
            values: Cow::Borrowed(values),
        };
        serde_json::to_vec(&record).map_err(|e| EncodeError { source: e.into() })
    }

    fn decode(&self, payload: &[u8]) -> Result<DecodedSession, DecodeError> {
        let record: WireRecord<'_> =
            serde_json::from_slice(payload).map_err(|e| DecodeError { source: e.into() })?;
        Ok(DecodedSession {
            deadline: record.deadline,
            values: record.values.into_owned(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to encode the session payload")]
/// The error returned by [`SessionCodec::encode`].
pub struct EncodeError {
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, thiserror::Error)]
#[error("Corrupt session payload")]
/// The error returned by [`SessionCodec::decode`] on malformed input.
///
/// On the load path this is absorbed into a fresh session—corruption in the
/// store never leaks to handlers.
pub struct DecodeError {
    #[source]
    pub source: anyhow::Error,
}

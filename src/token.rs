use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore as _;
use sha2::{Digest as _, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
/// The opaque identifier for a session.
///
/// A token is drawn from the operating system's cryptographic randomness
/// source: 32 bytes, encoded with the URL-safe base64 alphabet without
/// padding. It is the only piece of session state the client ever sees.
///
/// # Format stability
///
/// From an API perspective, a token is an opaque ASCII string.
/// Do **not** depend on the specifics of the underlying representation.
/// It may change between versions and those changes will not be considered
/// breaking changes.
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a new random token using the randomness source
    /// provided by the underlying operating system.
    pub fn random() -> Result<Self, TokenGenerationError> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(TokenGenerationError)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// The token as it travels in the session cookie.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The key under which a record is filed when token hashing is enabled:
/// the URL-safe base64 encoding of the SHA-256 digest of the token.
/// A stolen store dump then doesn't yield usable cookies.
pub(crate) fn hashed(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to draw randomness for a new session token")]
/// The randomness source is exhausted or unavailable.
/// Fatal to the request: a session must never be issued a guessable token.
pub struct TokenGenerationError(#[source] rand::Error);

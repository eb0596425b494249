use cookie::SameSite;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure the cookie used to carry the session token.
pub struct SessionCookieConfig {
    /// The name of the cookie used to store the session token.
    ///
    /// By default, the name is set to `session`.
    #[serde(default = "default_session_cookie_name")]
    pub name: String,
    /// Set the `Domain` attribute on the session cookie.
    ///
    /// By default, the attribute is not set.
    #[serde(default)]
    pub domain: Option<String>,
    /// Set the `Path` attribute on the session cookie.
    ///
    /// By default, the attribute is set to `/`.
    #[serde(default = "default_session_cookie_path")]
    pub path: Option<String>,
    /// Set the `Secure` attribute on the session cookie.
    ///
    /// If the cookie is marked as `Secure`, it will only be transmitted when
    /// the connection is secure (e.g. over HTTPS).
    ///
    /// Default is `false`. Turn it on for any deployment terminating TLS.
    #[serde(default)]
    pub secure: bool,
    /// Set the `HttpOnly` attribute on the session cookie.
    ///
    /// If the cookie is marked as `HttpOnly`, it will not be visible to
    /// JavaScript snippets running in the browser.
    ///
    /// Default is `true`.
    #[serde(default = "default_session_cookie_http_only")]
    pub http_only: bool,
    /// Set the `SameSite` attribute on the session cookie.
    ///
    /// By default, the attribute is set to [`SameSite::Lax`].
    /// `SameSite=None` forces the `Secure` attribute onto the emitted
    /// cookie, as required by browsers.
    #[serde(default = "default_session_cookie_same_site")]
    #[serde(with = "same_site")]
    pub same_site: Option<SameSite>,
    /// Whether the cookie outlives the browser session.
    ///
    /// When `true` (the default), the session cookie carries
    /// `Max-Age`/`Expires` attributes matching the session expiry. When
    /// `false`, neither attribute is set and the browser discards the cookie
    /// at the end of its session.
    ///
    /// Individual sessions can override this via
    /// [`Session::remember_me`](crate::Session::remember_me).
    #[serde(default = "default_session_cookie_persist")]
    pub persist: bool,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: default_session_cookie_name(),
            domain: None,
            path: default_session_cookie_path(),
            secure: false,
            http_only: default_session_cookie_http_only(),
            same_site: default_session_cookie_same_site(),
            persist: default_session_cookie_persist(),
        }
    }
}

fn default_session_cookie_name() -> String {
    "session".to_string()
}

fn default_session_cookie_http_only() -> bool {
    true
}

fn default_session_cookie_path() -> Option<String> {
    Some("/".to_string())
}

fn default_session_cookie_same_site() -> Option<SameSite> {
    Some(SameSite::Lax)
}

fn default_session_cookie_persist() -> bool {
    true
}

// Deserialization and serialization routines for the `same_site` attribute.
mod same_site {
    use cookie::SameSite;
    use serde::{de, Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<SameSite>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(SameSite::Strict) => serializer.serialize_some("Strict"),
            Some(SameSite::Lax) => serializer.serialize_some("Lax"),
            Some(SameSite::None) => serializer.serialize_some("None"),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SameSite>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match value.as_str() {
            "Strict" | "strict" => Ok(Some(SameSite::Strict)),
            "Lax" | "lax" => Ok(Some(SameSite::Lax)),
            "None" | "none" => Ok(Some(SameSite::None)),
            other => Err(de::Error::unknown_variant(
                other,
                &["Strict", "Lax", "None"],
            )),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure the way session state is stored and expired.
pub struct SessionStateConfig {
    /// The maximum lifetime of a session, i.e. the absolute instant past
    /// which a session is dead no matter how recently it was used.
    ///
    /// The deadline is fixed when the session is created and is **not**
    /// extended by activity.
    ///
    /// # Default
    ///
    /// The default value is 24 hours.
    #[serde(with = "humantime_serde", default = "default_lifetime")]
    pub lifetime: std::time::Duration,
    /// Expire sessions after a period of inactivity.
    ///
    /// When set, the expiry hint handed to the store at commit time is the
    /// earlier of the session deadline and `now + idle_timeout`; a client
    /// that stays quiet for the whole window finds its session gone on the
    /// next request.
    ///
    /// # Default
    ///
    /// Disabled.
    #[serde(with = "humantime_serde", default)]
    pub idle_timeout: Option<std::time::Duration>,
    /// File records under the SHA-256 digest of the token instead of the
    /// token itself.
    ///
    /// With hashing enabled, a leaked store dump doesn't contain usable
    /// cookie values. Look-ups hash the incoming token before hitting the
    /// store.
    ///
    /// # Default
    ///
    /// Disabled.
    #[serde(default)]
    pub hash_token_in_store: bool,
}

impl Default for SessionStateConfig {
    fn default() -> Self {
        Self {
            lifetime: default_lifetime(),
            idle_timeout: None,
            hash_token_in_store: false,
        }
    }
}

fn default_lifetime() -> std::time::Duration {
    std::time::Duration::from_secs(60 * 60 * 24)
}

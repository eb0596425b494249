//! Types related to [`SessionConfig`][crate::SessionConfig].
mod cookie;
mod state;

pub use cookie::SessionCookieConfig;
pub use state::SessionStateConfig;

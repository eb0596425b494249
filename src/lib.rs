/*!
Server-side HTTP session management for tower services.

Sessions are identified by an opaque random token carried in a cookie; all
state lives server-side behind a pluggable [`SessionStore`]. The
[`load_and_save`](SessionManager::load_and_save) middleware loads the
session named by the request cookie, attaches it to the request, and writes
it back—store record and `Set-Cookie` header—once the downstream handler is
done. Defaults follow
[OWASP's guidelines for secure session management](https://cheatsheetseries.owasp.org/cheatsheets/Session_Management_Cheat_Sheet.html):
128+ bits of token entropy, token regeneration on privilege change, idle and
absolute timeouts.

# Example

```no_run
use std::convert::Infallible;

use http::{Request, Response};
use server_session::{InMemorySessionStore, SessionManager, SessionStore};
use tower::{ServiceBuilder, ServiceExt};

# async fn run() -> Result<(), Box<dyn std::error::Error>> {
let store = SessionStore::new(InMemorySessionStore::new());
let manager = SessionManager::new(store);

let handler = {
    let manager = manager.clone();
    move |request: Request<String>| {
        let manager = manager.clone();
        async move {
            let session = manager.session(request.extensions());
            let visits = session.get_int("visits") + 1;
            session.put("visits", visits);
            Ok::<_, Infallible>(Response::new(format!("visit #{visits}")))
        }
    }
};

let service = ServiceBuilder::new()
    .layer(manager.load_and_save())
    .service_fn(handler);

let _response = service.oneshot(Request::new(String::new())).await?;
# Ok(())
# }
```
*/
pub mod config;

mod codec;
mod cookie_;
mod manager;
mod memory_store;
mod middleware;
mod session_;
mod store_;
mod token;
mod value;

pub use codec::{DecodedSession, JsonCodec, SessionCodec};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use memory_store::InMemorySessionStore;
pub use middleware::{ErrorHandler, FinalizeError, LoadAndSave, LoadAndSaveLayer};
pub use session_::{Session, SessionStatus};
pub use store_::SessionStore;
pub use token::SessionToken;
pub use value::SessionValue;

pub use crate::manager::errors;

pub mod store {
    //! Types and traits related to [`SessionStore`][super::SessionStore].
    pub use crate::store_::errors;
    pub use crate::store_::SessionStorageBackend;
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// Configure how sessions are managed.
///
/// Every field (and every field of the nested structs) has a sensible
/// default, so a zero-config manager is a working manager. The struct
/// deserializes cleanly from a configuration file.
pub struct SessionConfig {
    #[serde(default)]
    /// Configure the session cookie.
    pub cookie: config::SessionCookieConfig,
    #[serde(default)]
    /// Configure how the session state is stored and expired.
    pub state: config::SessionStateConfig,
}

impl SessionConfig {
    /// Create a new session configuration with the default settings.
    pub fn new() -> Self {
        Self::default()
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{header, HeaderValue, Request, Response, StatusCode};
use tower_layer::Layer;
use tower_service::Service;

use crate::cookie_::{removal_cookie, request_cookie_value, session_cookie};
use crate::manager::errors::{CommitError, DestroyError};
use crate::manager::SessionManager;
use crate::session_::{Session, SessionStatus};

/// The hook invoked when the middleware fails to write the session back on
/// the response path. Maps the failure to the status of the replacement
/// response.
pub type ErrorHandler = Arc<dyn Fn(&FinalizeError) -> StatusCode + Send + Sync>;

pub(crate) fn default_error_handler() -> ErrorHandler {
    Arc::new(|error| {
        tracing::error!(
            error = %error,
            "Failed to write the session back on the response path."
        );
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[derive(Debug, Clone)]
/// Wraps downstream services in the session lifecycle.
///
/// Built via [`SessionManager::load_and_save`].
pub struct LoadAndSaveLayer {
    manager: SessionManager,
}

impl LoadAndSaveLayer {
    pub(crate) fn new(manager: SessionManager) -> Self {
        Self { manager }
    }
}

impl<S> Layer<S> for LoadAndSaveLayer {
    type Service = LoadAndSave<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadAndSave {
            inner,
            manager: self.manager.clone(),
        }
    }
}

#[derive(Debug, Clone)]
/// The middleware bridging HTTP requests to the session lifecycle.
///
/// On the request path it reads the session cookie, loads the matching
/// session, and attaches it to the request. On the response path it
/// inspects the session status: a modified session is committed to the
/// store and announced to the client with a `Set-Cookie`; a destroyed
/// session gets its record deleted and an expiring cookie; an untouched
/// session leaves the response alone.
///
/// Because a tower service produces the complete response head before any
/// body byte reaches the wire, the `Set-Cookie` header is always in place
/// ahead of the body, no matter when the downstream handler produced it.
/// The downstream status, headers, and body pass through unchanged.
///
/// Every response additionally gains `Vary: Cookie` and a
/// `Cache-Control: no-cache="Set-Cookie"` directive, so shared caches never
/// replay one client's cookie to another.
pub struct LoadAndSave<S> {
    inner: S,
    manager: SessionManager,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for LoadAndSave<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let manager = self.manager.clone();
        // The service that just reported readiness is the one we must call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let token = request_cookie_value(request.headers(), manager.cookie_name());
            let session = manager.load(token.as_deref()).await;
            manager.attach(request.extensions_mut(), session.clone());

            let mut response = inner.call(request).await?;

            let headers = response.headers_mut();
            headers.append(header::VARY, HeaderValue::from_static("Cookie"));
            headers.append(
                header::CACHE_CONTROL,
                HeaderValue::from_static(r#"no-cache="Set-Cookie""#),
            );

            match write_back(&manager, &session).await {
                Ok(Some(set_cookie)) => {
                    response.headers_mut().append(header::SET_COOKIE, set_cookie);
                    Ok(response)
                }
                Ok(None) => Ok(response),
                Err(error) => {
                    let status = (manager.error_handler())(&error);
                    let mut replacement = Response::new(ResBody::default());
                    *replacement.status_mut() = status;
                    Ok(replacement)
                }
            }
        })
    }
}

/// Sync the session with the store and produce the `Set-Cookie` header, if
/// one is due.
async fn write_back(
    manager: &SessionManager,
    session: &Session,
) -> Result<Option<HeaderValue>, FinalizeError> {
    let cookie = match session.status() {
        SessionStatus::Unmodified => return Ok(None),
        SessionStatus::Modified => {
            let (token, expiry) = manager.commit(session).await?;
            let persist = session.effective_persist(manager.config().cookie.persist);
            session_cookie(&manager.config().cookie, token.as_str(), expiry, persist)
        }
        SessionStatus::Destroyed => {
            // The record may already be gone if the handler went through
            // `SessionManager::destroy`; deletion is idempotent.
            if let Some(token) = session.token() {
                manager
                    .delete_record(token.as_str())
                    .await
                    .map_err(DestroyError::from)?;
            }
            removal_cookie(&manager.config().cookie)
        }
    };
    Ok(Some(HeaderValue::try_from(cookie.to_string())?))
}

/// The error surfaced through the manager's error hook when the session
/// cannot be written back.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FinalizeError {
    #[error("Failed to commit the session record")]
    Commit(#[from] CommitError),
    #[error("Failed to delete the destroyed session record")]
    Destroy(#[from] DestroyError),
    #[error("The composed session cookie is not a valid header value")]
    InvalidCookie(#[from] http::header::InvalidHeaderValue),
}

//! Builds the `Set-Cookie` values emitted by the middleware and extracts
//! the session cookie from incoming requests.
use cookie::{Cookie, SameSite};
use http::header::COOKIE;
use http::HeaderMap;
use time::{Duration, OffsetDateTime};

use crate::config::SessionCookieConfig;

/// The `Set-Cookie` for a live session.
///
/// `Max-Age` (seconds until `expiry`, floored at zero) and `Expires` are
/// only written when `persist` is true; otherwise the cookie dies with the
/// browser session.
pub(crate) fn session_cookie(
    config: &SessionCookieConfig,
    token: &str,
    expiry: OffsetDateTime,
    persist: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.name.clone(), token.to_owned());
    apply_attributes(&mut cookie, config);
    if persist {
        let max_age = expiry - OffsetDateTime::now_utc();
        cookie.set_max_age(max_age.max(Duration::ZERO));
        cookie.set_expires(expiry);
    }
    cookie
}

/// The `Set-Cookie` that makes the client discard its session cookie:
/// empty value, `Max-Age=0`, `Expires` pinned one second after the epoch.
pub(crate) fn removal_cookie(config: &SessionCookieConfig) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.name.clone(), "");
    apply_attributes(&mut cookie, config);
    cookie.set_max_age(Duration::ZERO);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
    cookie
}

fn apply_attributes(cookie: &mut Cookie<'static>, config: &SessionCookieConfig) {
    if let Some(path) = config.path.as_deref() {
        cookie.set_path(path.to_owned());
    }
    if let Some(domain) = config.domain.as_deref() {
        cookie.set_domain(domain.to_owned());
    }
    if config.http_only {
        cookie.set_http_only(true);
    }
    let mut secure = config.secure;
    if let Some(same_site) = config.same_site {
        cookie.set_same_site(same_site);
        // Browsers reject SameSite=None cookies without the Secure attribute.
        if same_site == SameSite::None {
            secure = true;
        }
    }
    if secure {
        cookie.set_secure(true);
    }
}

/// The value of the session cookie on the incoming request, if any.
pub(crate) fn request_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(raw).flatten() {
            if cookie.name() == name {
                return Some(cookie.value().to_owned());
            }
        }
    }
    None
}

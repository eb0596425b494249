use googletest::matcher::{self, Matcher, MatcherBase};
use time::OffsetDateTime;

use crate::helpers::SetCookie;

/// Check if the cookie instructs the client to discard its session cookie.
pub fn is_removal_cookie() -> RemovalCookieMatcher {
    RemovalCookieMatcher
}

#[derive(Clone, Copy, MatcherBase)]
pub struct RemovalCookieMatcher;

impl Matcher<&SetCookie> for RemovalCookieMatcher {
    fn matches(&self, actual: &SetCookie) -> matcher::MatcherResult {
        let epoch_plus_one = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(1);
        let expires_at_epoch = actual
            .cookie
            .expires_datetime()
            .map(|expires| expires == epoch_plus_one)
            .unwrap_or(false);
        let max_age_is_zero = actual.cookie.max_age() == Some(time::Duration::ZERO);
        (actual.token().is_empty() && expires_at_epoch && max_age_is_zero).into()
    }

    fn describe(
        &self,
        matcher_result: matcher::MatcherResult,
    ) -> googletest::description::Description {
        match matcher_result {
            matcher::MatcherResult::Match => "is a removal cookie",
            matcher::MatcherResult::NoMatch => "isn't a removal cookie",
        }
        .into()
    }
}

//! Visitor session cookie.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

pub const SESSION_COOKIE_NAME: &str = "portal_session";

/// Build the `HttpOnly` cookie carrying the visitor's session handle.
///
/// # Errors
/// Returns an error if the handle contains characters invalid in a header.
pub fn session_cookie(
    handle: &str,
    ttl_seconds: u64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={handle}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session handle from the request's `Cookie` headers, if any.
#[must_use]
pub fn session_handle(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
}

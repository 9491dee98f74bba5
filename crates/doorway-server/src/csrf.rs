//! Double-submit anti-forgery tokens for the sign-in forms.
//!
//! The form page sets a random token both in a cookie and in a hidden
//! field; a submission is accepted only when the two agree.

use doorway_auth::cookie::{SameSite, SessionCookie, constant_time_equal, cookie_map};
use doorway_auth::token::generate_random_token;

use crate::error::ApiError;

pub const COOKIE_NAME: &str = "csrf_token";
pub const FIELD_NAME: &str = "authenticity_token";

/// A fresh token and the cookie carrying it.
pub fn issue(secure: bool) -> (String, SessionCookie) {
    let token = generate_random_token();
    let cookie = SessionCookie {
        name: COOKIE_NAME.into(),
        value: token.clone(),
        path: "/".into(),
        max_age: 60 * 60,
        http_only: true,
        secure,
        same_site: SameSite::Lax,
    };
    (token, cookie)
}

pub fn verify(cookie_header: Option<&str>, submitted: &str) -> Result<(), ApiError> {
    let expected = cookie_header
        .and_then(|header| cookie_map(header).remove(COOKIE_NAME))
        .ok_or(ApiError::Forbidden)?;

    if !submitted.is_empty() && constant_time_equal(expected.as_bytes(), submitted.as_bytes()) {
        Ok(())
    } else {
        tracing::debug!("authenticity token mismatch");
        Err(ApiError::Forbidden)
    }
}

//! Route handlers.

pub mod identity;
pub mod session;

use axum::http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use doorway_auth::SessionCookie;
use doorway_cache::{ConditionalRequest, Freshness};

/// Validators the client sent.
pub(crate) fn conditional_request(headers: &HeaderMap) -> ConditionalRequest {
    ConditionalRequest::new(
        header_str(headers, IF_NONE_MATCH),
        header_str(headers, IF_MODIFIED_SINCE),
    )
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `304` with validators, or the rendered body with validators attached.
/// `render` runs only when the body is needed.
pub(crate) fn respond<R: IntoResponse>(freshness: Freshness, render: impl FnOnce() -> R) -> Response {
    let mut response = if freshness.is_not_modified() {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        render().into_response()
    };

    let headers = response.headers_mut();
    for (name, value) in freshness.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    response
}

pub(crate) fn with_cookie(mut response: Response, cookie: &SessionCookie) -> Response {
    if let Ok(value) = HeaderValue::from_str(&cookie.to_header_value()) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

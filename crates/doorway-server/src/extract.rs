//! Request extractors.
//!
//! [`ClientInfo`] reads what the request says about itself without
//! touching storage. [`CurrentRequest`] resolves the signed-in identity
//! from the session cookie into a [`RequestContext`].

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{COOKIE, USER_AGENT};
use axum::http::request::Parts;
use doorway_core::context::RequestContext;
use surrealdb::Connection;

use crate::AppState;
use crate::error::ApiError;

/// Client metadata and the account segment of the path.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub account_external_id: Option<u64>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    /// All `Cookie` headers joined into one.
    pub cookie_header: Option<String>,
}

impl ClientInfo {
    fn from_parts(parts: &Parts) -> Self {
        let cookies: Vec<&str> = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        Self {
            account_external_id: account_segment(parts.uri.path()),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            ip_address: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
            cookie_header: (!cookies.is_empty()).then(|| cookies.join("; ")),
        }
    }
}

/// The numeric first path segment, e.g. `1234567` in `/1234567/me`.
pub fn account_segment(path: &str) -> Option<u64> {
    let segment = path.trim_start_matches('/').split('/').next()?;
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// The per-request context. Anonymous when no valid session cookie was
/// sent; rejects with `404` when the path names an unknown account.
#[derive(Debug, Clone)]
pub struct CurrentRequest(pub RequestContext);

impl<C: Connection> FromRequestParts<AppState<C>> for CurrentRequest {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<C>,
    ) -> Result<Self, Self::Rejection> {
        let client = ClientInfo::from_parts(parts);
        let ctx = state
            .auth
            .resume_session(
                client.cookie_header.as_deref(),
                client.account_external_id,
                client.user_agent,
                client.ip_address,
            )
            .await?;
        Ok(CurrentRequest(ctx))
    }
}

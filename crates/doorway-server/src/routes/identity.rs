//! Signed-in views, served with validators so repeat visits can be
//! answered with `304 Not Modified`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use doorway_cache::fragment::overlay;
use doorway_cache::{CachePolicy, CacheVersioned, Fingerprint, FragmentKey, evaluate};
use doorway_core::error::DoorwayError;
use doorway_core::models::{account::Account, user::User};
use doorway_core::repository::AccountRepository;
use serde_json::json;
use surrealdb::Connection;

use super::{conditional_request, respond};
use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentRequest;

/// Bumped whenever the rendered shape of a view changes.
const TEMPLATE_VERSION: &str = "v1";

/// `GET /my/identity`: the identity and the accounts it belongs to.
pub async fn show<C: Connection>(
    State(state): State<AppState<C>>,
    CurrentRequest(ctx): CurrentRequest,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = ctx.identity.ok_or(ApiError::Unauthenticated)?;
    let accounts = state.accounts().list_for_identity(identity.id).await?;

    let fingerprint = accounts
        .iter()
        .fold(
            Fingerprint::builder()
                .part("my/identity")
                .part(TEMPLATE_VERSION)
                .record(&identity),
            |builder, account| builder.record(account),
        )
        .build();
    let freshness = evaluate(
        &conditional_request(&headers),
        &fingerprint,
        CachePolicy::Conditional,
    );

    Ok(respond(freshness, || {
        let key = FragmentKey::builder("identities/accounts")
            .records(accounts.iter().map(|a| a as &dyn CacheVersioned))
            .build();
        let accounts_json = state.fragments.fetch(&key, || render_accounts(&accounts));

        let body = format!(
            r#"{{"id":{},"email_address":{},"accounts":{}}}"#,
            json!(identity.id),
            json!(identity.email_address),
            accounts_json
        );
        ([(CONTENT_TYPE, "application/json")], body)
    }))
}

fn render_accounts(accounts: &[Account]) -> String {
    accounts
        .iter()
        .map(|account| {
            json!({
                "external_id": account.external_id,
                "name": account.name,
                "path": account.path_prefix(),
            })
        })
        .collect::<serde_json::Value>()
        .to_string()
}

/// `GET /{account}/me`: the signed-in identity's membership in the account.
///
/// The membership card is cached per account and user. The viewer's id is
/// emitted outside the card so the client can personalize it.
pub async fn membership<C: Connection>(
    State(state): State<AppState<C>>,
    CurrentRequest(ctx): CurrentRequest,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = ctx.identity.ok_or(ApiError::Unauthenticated)?;
    let account = ctx.account.ok_or_else(|| DoorwayError::NotFound {
        entity: "account".into(),
        id: "path".into(),
    })?;
    let user = ctx.user.ok_or_else(|| DoorwayError::NotFound {
        entity: "user".into(),
        id: account.external_id.to_string(),
    })?;

    let fingerprint = Fingerprint::builder()
        .part("accounts/me")
        .part(TEMPLATE_VERSION)
        .record(&account)
        .record(&user)
        .record(&identity)
        .build();
    let freshness = evaluate(
        &conditional_request(&headers),
        &fingerprint,
        CachePolicy::Conditional,
    );

    Ok(respond(freshness, || {
        let key = FragmentKey::builder("accounts/membership")
            .record(&account)
            .record(&user)
            .build();
        let card = state.fragments.fetch(&key, || render_membership(&account, &user));

        Html(format!(
            "<!doctype html>\n<html><head>{}</head><body>\n{}\n</body></html>\n",
            overlay::viewer_meta_tag(identity.id),
            card
        ))
    }))
}

fn render_membership(account: &Account, user: &User) -> String {
    format!(
        "<section class=\"membership\" {}>\n<h1>{}</h1>\n<p>{} ({:?})</p>\n</section>",
        overlay::creator_attribute(user.identity_id),
        escape_html(&account.name),
        escape_html(&user.name),
        user.role
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

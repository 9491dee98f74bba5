//! Sign-in form, link requests, redemption and sign-out.

use axum::Form;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use doorway_auth::{MagicLinkRequest, MagicLinkRequested, RedeemInput, SignUpInput};
use doorway_cache::{CachePolicy, Fingerprint, evaluate};
use serde::Deserialize;
use surrealdb::Connection;

use super::{conditional_request, respond, with_cookie};
use crate::AppState;
use crate::csrf;
use crate::error::ApiError;
use crate::extract::{ClientInfo, CurrentRequest};

#[derive(Debug, Deserialize)]
pub struct EmailForm {
    pub email_address: String,
    #[serde(default)]
    pub authenticity_token: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticityForm {
    #[serde(default)]
    pub authenticity_token: String,
}

fn account_prefix(account_external_id: Option<u64>) -> String {
    account_external_id
        .map(|id| format!("/{id}"))
        .unwrap_or_default()
}

/// `GET /session/new`: the sign-in form. Carries a fresh anti-forgery
/// token, so it is never served from a client cache.
pub async fn new<C: Connection>(
    State(state): State<AppState<C>>,
    client: ClientInfo,
    headers: HeaderMap,
) -> Response {
    let (token, cookie) = csrf::issue(state.auth.config().secure_cookies);
    let action = format!(
        "{}/session/magic_link",
        account_prefix(client.account_external_id)
    );

    let freshness = evaluate(
        &conditional_request(&headers),
        &Fingerprint::builder().part("session/new").build(),
        CachePolicy::NoStore,
    );
    let response = respond(freshness, || {
        Html(format!(
            "<!doctype html>\n\
             <html><body>\n\
             <form method=\"post\" action=\"{action}\">\n\
             <input type=\"hidden\" name=\"{field}\" value=\"{token}\">\n\
             <input type=\"email\" name=\"email_address\" required autofocus>\n\
             <button type=\"submit\">Send me a sign-in link</button>\n\
             </form>\n\
             </body></html>\n",
            field = csrf::FIELD_NAME,
        ))
    });
    with_cookie(response, &cookie)
}

fn link_requested() -> Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": MagicLinkRequested::MESSAGE })),
    )
        .into_response()
}

/// `POST /session/magic_link`: same response whether or not the address
/// is known.
pub async fn request_link<C: Connection>(
    State(state): State<AppState<C>>,
    client: ClientInfo,
    Form(form): Form<EmailForm>,
) -> Result<Response, ApiError> {
    csrf::verify(client.cookie_header.as_deref(), &form.authenticity_token)?;

    state
        .auth
        .request_magic_link(MagicLinkRequest {
            email_address: form.email_address,
            account_external_id: client.account_external_id,
            ip_address: client.ip_address,
        })
        .await?;

    Ok(link_requested())
}

/// `POST /signup`
pub async fn sign_up<C: Connection>(
    State(state): State<AppState<C>>,
    client: ClientInfo,
    Form(form): Form<EmailForm>,
) -> Result<Response, ApiError> {
    csrf::verify(client.cookie_header.as_deref(), &form.authenticity_token)?;

    state
        .auth
        .sign_up(SignUpInput {
            email_address: form.email_address,
            ip_address: client.ip_address,
        })
        .await?;

    Ok(link_requested())
}

/// `GET /session/magic_link/{token}`
pub async fn redeem<C: Connection>(
    State(state): State<AppState<C>>,
    client: ClientInfo,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    redeem_link(&state, client, None, token).await
}

/// `GET /{account}/session/magic_link/{token}`
pub async fn redeem_in_account<C: Connection>(
    State(state): State<AppState<C>>,
    client: ClientInfo,
    Path((account, token)): Path<(u64, String)>,
) -> Result<Response, ApiError> {
    redeem_link(&state, client, Some(account), token).await
}

async fn redeem_link<C: Connection>(
    state: &AppState<C>,
    client: ClientInfo,
    account_external_id: Option<u64>,
    token: String,
) -> Result<Response, ApiError> {
    let redeemed = state
        .auth
        .redeem_magic_link(RedeemInput {
            token,
            account_external_id,
            user_agent: client.user_agent,
            ip_address: client.ip_address,
        })
        .await?;

    let location = match &redeemed.account {
        Some(account) => format!("{}/me", account.path_prefix()),
        None => "/my/identity".to_string(),
    };
    Ok(with_cookie(
        Redirect::to(&location).into_response(),
        &redeemed.cookie,
    ))
}

/// `POST /session/destroy`
pub async fn destroy<C: Connection>(
    State(state): State<AppState<C>>,
    CurrentRequest(ctx): CurrentRequest,
    client: ClientInfo,
    Form(form): Form<AuthenticityForm>,
) -> Result<Response, ApiError> {
    csrf::verify(client.cookie_header.as_deref(), &form.authenticity_token)?;

    let cookie = state.auth.sign_out(&ctx).await?;
    let location = format!(
        "{}/session/new",
        account_prefix(ctx.account.as_ref().map(|a| a.external_id))
    );
    Ok(with_cookie(Redirect::to(&location).into_response(), &cookie))
}

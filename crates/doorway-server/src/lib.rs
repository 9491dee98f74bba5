//! Doorway Server: axum routes for magic-link sign-in and conditional
//! JSON/HTML views.

pub mod config;
pub mod csrf;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use doorway_auth::AuthService;
use doorway_cache::FragmentCache;
use doorway_db::repository::{
    SurrealAccountRepository, SurrealIdentityRepository, SurrealSessionRepository,
    SurrealUserRepository,
};
use surrealdb::{Connection, Surreal};
use tower_http::trace::TraceLayer;

/// The auth service wired to SurrealDB repositories.
pub type SurrealAuthService<C> = AuthService<
    SurrealIdentityRepository<C>,
    SurrealAccountRepository<C>,
    SurrealUserRepository<C>,
    SurrealSessionRepository<C>,
>;

/// Shared handler state.
pub struct AppState<C: Connection> {
    pub db: Surreal<C>,
    pub auth: Arc<SurrealAuthService<C>>,
    pub fragments: Arc<FragmentCache>,
}

impl<C: Connection> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            auth: Arc::clone(&self.auth),
            fragments: Arc::clone(&self.fragments),
        }
    }
}

impl<C: Connection> AppState<C> {
    pub fn new(db: Surreal<C>, auth: SurrealAuthService<C>) -> Self {
        Self {
            db,
            auth: Arc::new(auth),
            fragments: Arc::new(FragmentCache::new()),
        }
    }

    pub fn accounts(&self) -> SurrealAccountRepository<C> {
        SurrealAccountRepository::new(self.db.clone())
    }
}

/// Build the auth service over `db`.
pub fn auth_service<C: Connection>(
    db: &Surreal<C>,
    config: doorway_auth::AuthConfig,
    deliveries: doorway_auth::DeliveryQueue,
) -> SurrealAuthService<C> {
    AuthService::new(
        SurrealIdentityRepository::new(db.clone()),
        SurrealAccountRepository::new(db.clone()),
        SurrealUserRepository::new(db.clone()),
        SurrealSessionRepository::new(db.clone()),
        config,
        deliveries,
    )
}

/// Every route, with request tracing.
///
/// Routes under `/{account}` are the account-scoped twins of the global
/// ones; the account segment is the account's numeric external id.
pub fn router<C: Connection>(state: AppState<C>) -> Router {
    use routes::{identity, session};

    Router::new()
        .route("/session/new", get(session::new::<C>))
        .route("/{account}/session/new", get(session::new::<C>))
        .route("/session/magic_link", post(session::request_link::<C>))
        .route("/{account}/session/magic_link", post(session::request_link::<C>))
        .route("/signup", post(session::sign_up::<C>))
        .route("/session/magic_link/{token}", get(session::redeem::<C>))
        .route(
            "/{account}/session/magic_link/{token}",
            get(session::redeem_in_account::<C>),
        )
        .route("/session/destroy", post(session::destroy::<C>))
        .route("/{account}/session/destroy", post(session::destroy::<C>))
        .route("/my/identity", get(identity::show::<C>))
        .route("/{account}/me", get(identity::membership::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

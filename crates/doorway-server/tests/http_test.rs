// HTTP-level tests using tower::ServiceExt::oneshot against the full
// router, backed by in-memory SurrealDB.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use doorway_auth::{AuthConfig, DeliveryQueue, LinkRequest, MagicLinkDelivery};
use doorway_core::models::account::CreateAccount;
use doorway_core::models::identity::CreateIdentity;
use doorway_core::models::user::{CreateUser, UpdateUser, UserRole};
use doorway_core::repository::{AccountRepository, IdentityRepository, UserRepository};
use doorway_db::repository::{
    SurrealAccountRepository, SurrealIdentityRepository, SurrealUserRepository,
};
use doorway_server::{AppState, SurrealAuthService, auth_service, router};
use http_body_util::BodyExt;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;
use uuid::Uuid;

const CSRF: &str = "test-authenticity-token";

struct TestApp {
    app: Router,
    db: Surreal<Db>,
    auth: Arc<SurrealAuthService<Db>>,
    outbox: UnboundedReceiver<LinkRequest>,
    acme_id: Uuid,
    alice_at_acme_id: Uuid,
}

fn test_config() -> AuthConfig {
    AuthConfig {
        secret_key_base: "http-test-secret-key-base-0123456789".into(),
        base_url: "https://doorway.test".into(),
        ..Default::default()
    }
}

async fn setup() -> TestApp {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    doorway_db::run_migrations(&db).await.unwrap();

    let alice = SurrealIdentityRepository::new(db.clone())
        .create(CreateIdentity {
            email_address: "alice@example.com".into(),
        })
        .await
        .unwrap();
    let accounts = SurrealAccountRepository::new(db.clone());
    let acme = accounts
        .create(CreateAccount {
            external_id: 1_234_567,
            name: "Acme".into(),
        })
        .await
        .unwrap();
    accounts
        .create(CreateAccount {
            external_id: 7_654_321,
            name: "Globex".into(),
        })
        .await
        .unwrap();
    let alice_at_acme = SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            account_id: acme.id,
            identity_id: alice.id,
            name: "Alice".into(),
            role: UserRole::Owner,
        })
        .await
        .unwrap();

    let (queue, outbox) = DeliveryQueue::channel();
    let state = AppState::new(db.clone(), auth_service(&db, test_config(), queue));
    let auth = Arc::clone(&state.auth);

    TestApp {
        app: router(state),
        db,
        auth,
        outbox,
        acme_id: acme.id,
        alice_at_acme_id: alice_at_acme.id,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn request_link(&self, path: &str, email: &str) -> Response<Body> {
        self.send(form_post(path, &format!("email_address={email}"), None))
            .await
    }

    /// Request a link, redeem it, and return the session cookie pair.
    async fn sign_in(&mut self, prefix: &str) -> (Response<Body>, String) {
        let response = self
            .request_link(&format!("{prefix}/session/magic_link"), "alice%40example.com")
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let token = self.mailed_token().await;

        let response = self
            .send(get(&format!("{prefix}/session/magic_link/{token}"), None))
            .await;
        let cookie = session_cookie_pair(&response);
        (response, cookie)
    }

    /// Resolve the next queued link request as the delivery worker would.
    async fn next_delivery(&mut self) -> Option<MagicLinkDelivery> {
        let queued = self.outbox.try_recv().expect("a request should have been queued");
        self.auth.resolve_link(&queued).await.unwrap()
    }

    async fn mailed_token(&mut self) -> String {
        let delivery = self.next_delivery().await.expect("a link should have been signed");
        delivery.url.rsplit('/').next().unwrap().to_string()
    }
}

fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// A form submission carrying a matching anti-forgery cookie and field.
fn form_post(path: &str, fields: &str, cookie: Option<&str>) -> Request<Body> {
    let mut cookies = format!("csrf_token={CSRF}");
    if let Some(cookie) = cookie {
        cookies = format!("{cookie}; {cookies}");
    }
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookies)
        .body(Body::from(format!("{fields}&authenticity_token={CSRF}")))
        .unwrap()
}

fn header_str<'a>(response: &'a Response<Body>, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn set_cookie(response: &Response<Body>) -> &str {
    header_str(response, header::SET_COOKIE).expect("a Set-Cookie header")
}

/// `name=value` from the `Set-Cookie` header, ready for a `Cookie` header.
fn session_cookie_pair(response: &Response<Body>) -> String {
    set_cookie(response).split(';').next().unwrap().to_string()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

// ─── Sign-in form ─────────────────────────────────────────────────

#[tokio::test]
async fn sign_in_form_is_never_cached() {
    let t = setup().await;
    let response = t.send(get("/1234567/session/new", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CACHE_CONTROL), Some("no-store"));
    assert!(response.headers().get(header::ETAG).is_none());
    assert!(set_cookie(&response).starts_with("csrf_token="));

    let html = body_string(response).await;
    assert!(html.contains(r#"action="/1234567/session/magic_link""#));
    assert!(html.contains(r#"name="authenticity_token""#));
}

#[tokio::test]
async fn sign_in_form_ignores_validators() {
    let t = setup().await;
    let response = t
        .send(
            Request::builder()
                .uri("/session/new")
                .header(header::IF_NONE_MATCH, "*")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ─── Link requests ────────────────────────────────────────────────

#[tokio::test]
async fn link_response_does_not_reveal_whether_email_is_known() {
    let mut t = setup().await;

    let known = t
        .request_link("/session/magic_link", "alice%40example.com")
        .await;
    let unknown = t
        .request_link("/session/magic_link", "nobody%40example.com")
        .await;

    assert_eq!(known.status(), StatusCode::ACCEPTED);
    assert_eq!(known.status(), unknown.status());
    assert_eq!(known.headers(), unknown.headers());
    assert_eq!(body_string(known).await, body_string(unknown).await);

    // Both were queued; only the known address resolves to a link.
    assert!(t.next_delivery().await.is_some());
    assert!(t.next_delivery().await.is_none());
    assert!(t.outbox.try_recv().is_err());
}

#[tokio::test]
async fn closed_delivery_queue_answers_every_address_alike() {
    let mut t = setup().await;
    t.outbox.close();

    let known = t
        .request_link("/session/magic_link", "alice%40example.com")
        .await;
    let unknown = t
        .request_link("/session/magic_link", "nobody%40example.com")
        .await;

    assert_eq!(known.status(), StatusCode::ACCEPTED);
    assert_eq!(known.status(), unknown.status());
    assert_eq!(body_string(known).await, body_string(unknown).await);
}

#[tokio::test]
async fn link_request_without_matching_token_is_forbidden() {
    let t = setup().await;
    let request = Request::builder()
        .method("POST")
        .uri("/session/magic_link")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, "csrf_token=one")
        .body(Body::from("email_address=alice%40example.com&authenticity_token=two"))
        .unwrap();

    let response = t.send(request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["status"], 403);
}

#[tokio::test]
async fn eleventh_link_request_is_rate_limited() {
    let t = setup().await;
    for _ in 0..10 {
        let response = t
            .request_link("/session/magic_link", "alice%40example.com")
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = t
        .request_link("/session/magic_link", "alice%40example.com")
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"]["status"], 429);
}

#[tokio::test]
async fn sign_up_creates_identity_and_mails_link() {
    let mut t = setup().await;
    let response = t
        .send(form_post("/signup", "email_address=Bob%40Example.com", None))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let delivery = t.next_delivery().await.unwrap();
    assert_eq!(delivery.email_address, "bob@example.com");
    assert!(
        delivery
            .url
            .starts_with("https://doorway.test/session/magic_link/")
    );
}

// ─── Redemption ───────────────────────────────────────────────────

#[tokio::test]
async fn account_link_sets_account_scoped_cookie() {
    let mut t = setup().await;
    let (response, cookie) = t.sign_in("/1234567").await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header_str(&response, header::LOCATION), Some("/1234567/me"));
    let set = set_cookie(&response);
    assert!(set.contains("; Path=/1234567;"));
    assert!(set.contains("; HttpOnly"));

    let response = t.send(get("/1234567/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains(r#"<meta name="current-identity-id""#));
    assert!(html.contains("<h1>Acme</h1>"));

    // The browser does not send the cookie to another account's paths.
    let response = t.send(get("/7654321/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn membership_page_is_not_found_for_non_members() {
    let mut t = setup().await;
    let (_, cookie) = t.sign_in("").await;

    let response = t.send(get("/7654321/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let t = setup().await;
    let response = t.send(get("/9999999/me", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_token_gets_generic_error() {
    let t = setup().await;
    let response = t
        .send(get("/session/magic_link/not-a-real-token", None))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_json(response).await;
    assert_eq!(
        body["error"]["message"],
        "That sign-in link is invalid or has expired."
    );
}

// ─── Conditional GET ──────────────────────────────────────────────

#[tokio::test]
async fn identity_page_answers_not_modified_until_a_record_changes() {
    let mut t = setup().await;
    let (response, cookie) = t.sign_in("").await;
    assert_eq!(header_str(&response, header::LOCATION), Some("/my/identity"));
    assert!(set_cookie(&response).contains("; Path=/;"));

    let first = t.send(get("/my/identity", Some(&cookie))).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        header_str(&first, header::CACHE_CONTROL),
        Some("max-age=0, private, must-revalidate")
    );
    let etag = header_str(&first, header::ETAG).unwrap().to_string();
    let body = body_json(first).await;
    assert_eq!(body["email_address"], "alice@example.com");
    assert_eq!(body["accounts"][0]["external_id"], 1_234_567);

    let conditional = |etag: &str| {
        Request::builder()
            .uri("/my/identity")
            .header(header::COOKIE, &cookie)
            .header(header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .unwrap()
    };

    let second = t.send(conditional(&etag)).await;
    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header_str(&second, header::ETAG), Some(etag.as_str()));
    assert!(body_string(second).await.is_empty());

    // Renaming the membership touches the identity.
    tokio::time::sleep(Duration::from_millis(5)).await;
    SurrealUserRepository::new(t.db.clone())
        .update(
            t.acme_id,
            t.alice_at_acme_id,
            UpdateUser {
                name: Some("Alice Smith".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let third = t.send(conditional(&etag)).await;
    assert_eq!(third.status(), StatusCode::OK);
    assert_ne!(header_str(&third, header::ETAG), Some(etag.as_str()));
}

#[tokio::test]
async fn identity_page_requires_sign_in() {
    let t = setup().await;
    let response = t.send(get("/my/identity", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ─── Sign-out ─────────────────────────────────────────────────────

#[tokio::test]
async fn sign_out_clears_cookie_and_ends_session() {
    let mut t = setup().await;
    let (_, cookie) = t.sign_in("/1234567").await;

    let response = t
        .send(form_post("/1234567/session/destroy", "x=1", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        header_str(&response, header::LOCATION),
        Some("/1234567/session/new")
    );
    assert!(
        set_cookie(&response).starts_with("session_token=; Path=/1234567; Max-Age=0")
    );

    let response = t.send(get("/1234567/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

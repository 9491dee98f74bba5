//! Link requests must cost the same for every address: no repository
//! access on the request path, and the same result even when the
//! delivery queue is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use doorway_auth::{
    AuthConfig, AuthService, DeliveryQueue, LinkRequest, MagicLinkRequest, MagicLinkRequested,
};
use doorway_core::error::{DoorwayError, DoorwayResult};
use doorway_core::models::account::{Account, CreateAccount};
use doorway_core::models::identity::{CreateIdentity, Identity};
use doorway_core::models::session::{CreateSession, Session};
use doorway_core::models::user::{CreateUser, UpdateUser, User, UserRole};
use doorway_core::repository::{
    AccountRepository, IdentityRepository, SessionRepository, UserRepository,
};
use uuid::Uuid;

const ALICE: &str = "alice@example.com";
const ACME: u64 = 1_234_567;

/// Store that knows one identity with an active user in one account,
/// and counts every call made to it.
#[derive(Clone)]
struct RecordingStore {
    calls: Arc<AtomicUsize>,
    alice_id: Uuid,
    acme_id: Uuid,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            calls: Arc::default(),
            alice_id: Uuid::new_v4(),
            acme_id: Uuid::new_v4(),
        }
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn alice(&self) -> Identity {
        Identity {
            id: self.alice_id,
            email_address: ALICE.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn acme(&self) -> Account {
        Account {
            id: self.acme_id,
            external_id: ACME,
            name: "Acme".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn alice_at_acme(&self) -> User {
        User {
            id: Uuid::new_v4(),
            account_id: self.acme_id,
            identity_id: self.alice_id,
            name: "Alice".into(),
            role: UserRole::Owner,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

fn not_found(entity: &str, id: impl ToString) -> DoorwayError {
    DoorwayError::NotFound {
        entity: entity.into(),
        id: id.to_string(),
    }
}

impl IdentityRepository for RecordingStore {
    async fn create(&self, input: CreateIdentity) -> DoorwayResult<Identity> {
        self.record();
        Err(DoorwayError::AlreadyExists {
            entity: format!("identity {}", input.email_address),
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DoorwayResult<Identity> {
        self.record();
        if id == self.alice_id {
            Ok(self.alice())
        } else {
            Err(not_found("identity", id))
        }
    }

    async fn get_by_email(&self, email_address: &str) -> DoorwayResult<Identity> {
        self.record();
        if email_address == ALICE {
            Ok(self.alice())
        } else {
            Err(not_found("identity", email_address))
        }
    }
}

impl AccountRepository for RecordingStore {
    async fn create(&self, input: CreateAccount) -> DoorwayResult<Account> {
        self.record();
        Err(DoorwayError::AlreadyExists {
            entity: format!("account {}", input.external_id),
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DoorwayResult<Account> {
        self.record();
        Err(not_found("account", id))
    }

    async fn get_by_external_id(&self, external_id: u64) -> DoorwayResult<Account> {
        self.record();
        if external_id == ACME {
            Ok(self.acme())
        } else {
            Err(not_found("account", external_id))
        }
    }

    async fn list_for_identity(&self, _identity_id: Uuid) -> DoorwayResult<Vec<Account>> {
        self.record();
        Ok(vec![self.acme()])
    }
}

impl UserRepository for RecordingStore {
    async fn create(&self, input: CreateUser) -> DoorwayResult<User> {
        self.record();
        Err(DoorwayError::AlreadyExists {
            entity: format!("user {}", input.name),
        })
    }

    async fn get_by_id(&self, _account_id: Uuid, id: Uuid) -> DoorwayResult<User> {
        self.record();
        Err(not_found("user", id))
    }

    async fn get_by_identity(&self, account_id: Uuid, identity_id: Uuid) -> DoorwayResult<User> {
        self.record();
        if account_id == self.acme_id && identity_id == self.alice_id {
            Ok(self.alice_at_acme())
        } else {
            Err(not_found("user", identity_id))
        }
    }

    async fn list_by_identity(&self, _identity_id: Uuid) -> DoorwayResult<Vec<User>> {
        self.record();
        Ok(vec![self.alice_at_acme()])
    }

    async fn update(&self, _account_id: Uuid, id: Uuid, _input: UpdateUser) -> DoorwayResult<User> {
        self.record();
        Err(not_found("user", id))
    }
}

impl SessionRepository for RecordingStore {
    async fn create(&self, input: CreateSession) -> DoorwayResult<Session> {
        self.record();
        Ok(Session {
            id: Uuid::new_v4(),
            identity_id: input.identity_id,
            active_user_id: input.active_user_id,
            user_agent: input.user_agent,
            ip_address: input.ip_address,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DoorwayResult<Session> {
        self.record();
        Err(not_found("session", id))
    }

    async fn list_by_identity(&self, _identity_id: Uuid) -> DoorwayResult<Vec<Session>> {
        self.record();
        Ok(Vec::new())
    }

    async fn invalidate(&self, _id: Uuid) -> DoorwayResult<()> {
        self.record();
        Ok(())
    }

    async fn invalidate_identity_sessions(&self, _identity_id: Uuid) -> DoorwayResult<()> {
        self.record();
        Ok(())
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> DoorwayResult<u64> {
        self.record();
        Ok(0)
    }
}

type Service = AuthService<RecordingStore, RecordingStore, RecordingStore, RecordingStore>;

fn service(store: &RecordingStore, queue: DeliveryQueue) -> Service {
    AuthService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        AuthConfig {
            secret_key_base: "uniformity-secret-key-base-0123456789".into(),
            base_url: "https://doorway.test".into(),
            ..Default::default()
        },
        queue,
    )
}

fn request(email: &str, ip: &str) -> MagicLinkRequest {
    MagicLinkRequest {
        email_address: email.into(),
        account_external_id: Some(ACME),
        ip_address: Some(ip.into()),
    }
}

#[tokio::test]
async fn request_path_never_touches_the_store() {
    let store = RecordingStore::new();
    let (queue, mut outbox) = DeliveryQueue::channel();
    let service = service(&store, queue);

    for (email, ip) in [
        (ALICE, "192.0.2.1"),
        ("nobody@example.com", "192.0.2.2"),
        ("not an email", "192.0.2.3"),
    ] {
        let outcome = service.request_magic_link(request(email, ip)).await.unwrap();
        assert_eq!(outcome, MagicLinkRequested);
        assert_eq!(store.calls(), 0, "request for {email:?} hit the store");

        let queued = outbox.try_recv().unwrap();
        assert_eq!(queued.account_external_id, Some(ACME));
    }
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn lookups_happen_when_the_worker_resolves() {
    let store = RecordingStore::new();
    let (queue, _outbox) = DeliveryQueue::channel();
    let service = service(&store, queue);

    let known = service
        .resolve_link(&LinkRequest {
            email_address: ALICE.into(),
            account_external_id: Some(ACME),
        })
        .await
        .unwrap()
        .expect("alice is an active user of acme");
    assert_eq!(known.identity_id, store.alice_id);
    assert!(known.url.starts_with("https://doorway.test/1234567/session/magic_link/"));
    assert!(store.calls() > 0);

    let unknown = service
        .resolve_link(&LinkRequest {
            email_address: "nobody@example.com".into(),
            account_external_id: Some(ACME),
        })
        .await
        .unwrap();
    assert!(unknown.is_none());
}

#[tokio::test]
async fn lost_queue_does_not_distinguish_addresses() {
    let store = RecordingStore::new();
    let (queue, outbox) = DeliveryQueue::channel();
    drop(outbox);
    let service = service(&store, queue);

    let known = service
        .request_magic_link(request(ALICE, "192.0.2.1"))
        .await
        .unwrap();
    let unknown = service
        .request_magic_link(request("nobody@example.com", "192.0.2.2"))
        .await
        .unwrap();

    assert_eq!(known, unknown);
    assert_eq!(store.calls(), 0);
}

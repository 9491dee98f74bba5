//! Authentication service: magic-link issuance, redemption and session
//! resumption.

use std::sync::Arc;

use chrono::Duration;
use doorway_core::clock::{Clock, SystemClock};
use doorway_core::context::RequestContext;
use doorway_core::error::{DoorwayError, DoorwayResult};
use doorway_core::models::account::Account;
use doorway_core::models::identity::{CreateIdentity, Identity, normalize_email_address};
use doorway_core::models::session::{CreateSession, Session};
use doorway_core::models::user::User;
use doorway_core::repository::{
    AccountRepository, IdentityRepository, SessionRepository, UserRepository,
};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::cookie::{self, SessionCookie};
use crate::delivery::{DeliveryQueue, LinkRequest, LinkResolver, MagicLinkDelivery};
use crate::error::AuthError;
use crate::rate_limit::{RateLimiter, magic_link_keys};
use crate::token::{self, TokenPurpose};

/// Input for requesting a sign-in link.
#[derive(Debug, Clone)]
pub struct MagicLinkRequest {
    /// As typed by the user; normalized by the service.
    pub email_address: String,
    /// Set when the request came from an account's sign-in page.
    pub account_external_id: Option<u64>,
    pub ip_address: Option<String>,
}

/// Input for signing up with an email address.
#[derive(Debug, Clone)]
pub struct SignUpInput {
    pub email_address: String,
    pub ip_address: Option<String>,
}

/// Outcome of a link request. Carries nothing so that a known and an
/// unknown address produce the same response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicLinkRequested;

impl MagicLinkRequested {
    pub const MESSAGE: &'static str = "Check your email for a sign-in link.";
}

/// Input for redeeming a sign-in link.
#[derive(Debug, Clone)]
pub struct RedeemInput {
    pub token: String,
    /// The account segment of the redemption URL, if any.
    pub account_external_id: Option<u64>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Successful redemption.
#[derive(Debug, Clone)]
pub struct RedeemOutput {
    pub session: Session,
    pub identity: Identity,
    pub user: Option<User>,
    pub account: Option<Account>,
    /// Cookie to set on the response.
    pub cookie: SessionCookie,
}

/// Authentication service.
///
/// Generic over repository implementations so that the auth layer
/// has no dependency on the database crate.
pub struct AuthService<I, A, U, S>
where
    I: IdentityRepository,
    A: AccountRepository,
    U: UserRepository,
    S: SessionRepository,
{
    identities: I,
    accounts: A,
    users: U,
    sessions: S,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    deliveries: DeliveryQueue,
}

impl<I, A, U, S> AuthService<I, A, U, S>
where
    I: IdentityRepository,
    A: AccountRepository,
    U: UserRepository,
    S: SessionRepository,
{
    pub fn new(
        identities: I,
        accounts: A,
        users: U,
        sessions: S,
        config: AuthConfig,
        deliveries: DeliveryQueue,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = RateLimiter::for_magic_links(&config, Arc::clone(&clock));
        Self {
            identities,
            accounts,
            users,
            sessions,
            config,
            clock,
            limiter,
            deliveries,
        }
    }

    /// Replace the clock used for token expiry, session expiry and the
    /// rate-limit window. Resets the rate limiter.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = RateLimiter::for_magic_links(&self.config, Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Request a sign-in link.
    ///
    /// Only rate-limits and queues the request; the delivery worker looks
    /// the address up through [`AuthService::resolve_link`]. Every address,
    /// known or not, takes the same path here and gets the same result.
    pub async fn request_magic_link(
        &self,
        input: MagicLinkRequest,
    ) -> DoorwayResult<MagicLinkRequested> {
        let email = normalize_email_address(&input.email_address)
            .unwrap_or_else(|_| input.email_address.trim().to_lowercase());
        self.limiter
            .check(&magic_link_keys(&email, input.ip_address.as_deref()))?;

        self.queue_link(LinkRequest {
            email_address: email,
            account_external_id: input.account_external_id,
        });
        Ok(MagicLinkRequested)
    }

    /// Find or create the identity for `email_address`, then queue a
    /// global sign-in link for it.
    pub async fn sign_up(&self, input: SignUpInput) -> DoorwayResult<MagicLinkRequested> {
        let email = normalize_email_address(&input.email_address)?;
        self.limiter
            .check(&magic_link_keys(&email, input.ip_address.as_deref()))?;

        self.find_or_create_identity(&email).await?;
        self.queue_link(LinkRequest {
            email_address: email,
            account_external_id: None,
        });
        Ok(MagicLinkRequested)
    }

    /// Look up who a queued request is for and sign their link.
    ///
    /// `None` when the address is malformed, unknown, or has no active
    /// user in the requested account. Those still pay for one signature.
    pub async fn resolve_link(
        &self,
        request: &LinkRequest,
    ) -> DoorwayResult<Option<MagicLinkDelivery>> {
        let recipient = match normalize_email_address(&request.email_address) {
            Ok(email) => self.find_recipient(&email, request.account_external_id).await?,
            Err(_) => None,
        };

        match recipient {
            Some(identity) => self
                .build_delivery(&identity, request.account_external_id)
                .map(Some),
            None => {
                token::issue_token(
                    TokenPurpose::MagicLink,
                    Uuid::nil(),
                    request.account_external_id,
                    &self.config,
                    self.clock.now(),
                )?;
                tracing::debug!("magic link requested for unknown recipient");
                Ok(None)
            }
        }
    }

    /// Exchange a sign-in link for a new session.
    pub async fn redeem_magic_link(&self, input: RedeemInput) -> DoorwayResult<RedeemOutput> {
        let now = self.clock.now();
        let claims = token::verify_token(&input.token, TokenPurpose::MagicLink, &self.config, now)?;

        if claims.acc != input.account_external_id {
            tracing::debug!("magic link redeemed under the wrong account");
            return Err(AuthError::InvalidOrExpiredToken.into());
        }

        let identity = self
            .identities
            .get_by_id(claims.identity_id()?)
            .await
            .map_err(reject_missing)?;

        let (account, user) = match input.account_external_id {
            Some(external_id) => {
                let account = self
                    .accounts
                    .get_by_external_id(external_id)
                    .await
                    .map_err(reject_missing)?;
                let user = self
                    .users
                    .get_by_identity(account.id, identity.id)
                    .await
                    .map_err(reject_missing)?;
                if !user.active {
                    tracing::debug!(user_id = %user.id, "magic link redeemed for inactive user");
                    return Err(AuthError::InvalidOrExpiredToken.into());
                }
                (Some(account), Some(user))
            }
            None => (None, None),
        };

        let session = self
            .sessions
            .create(CreateSession {
                identity_id: identity.id,
                active_user_id: user.as_ref().map(|u| u.id),
                user_agent: input.user_agent,
                ip_address: input.ip_address,
                expires_at: now + Duration::seconds(self.config.session_lifetime_secs as i64),
            })
            .await?;

        let path = cookie::cookie_path(account.as_ref());
        let cookie = SessionCookie::for_session(session.id, &path, &self.config)?;

        tracing::info!(
            session_id = %session.id,
            identity_id = %identity.id,
            account = ?account.as_ref().map(|a| a.external_id),
            "session started"
        );

        Ok(RedeemOutput {
            session,
            identity,
            user,
            account,
            cookie,
        })
    }

    /// Build the request context from the `Cookie` header.
    ///
    /// Sessions that are missing, expired or carried by a badly signed
    /// cookie are ignored. Fails only when `account_external_id` names no
    /// account or the store is unavailable.
    pub async fn resume_session(
        &self,
        cookie_header: Option<&str>,
        account_external_id: Option<u64>,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> DoorwayResult<RequestContext> {
        let mut ctx = RequestContext::anonymous(user_agent, ip_address);

        if let Some(external_id) = account_external_id {
            ctx.account = Some(self.accounts.get_by_external_id(external_id).await?);
        }

        let Some(header) = cookie_header else {
            return Ok(ctx);
        };

        let now = self.clock.now();
        for session_id in cookie::read_session_ids(header, &self.config) {
            let session = match self.sessions.get_by_id(session_id).await {
                Ok(session) => session,
                Err(DoorwayError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if session.is_expired_at(now) {
                tracing::debug!(session_id = %session.id, "ignoring expired session");
                continue;
            }
            let identity = match self.identities.get_by_id(session.identity_id).await {
                Ok(identity) => identity,
                Err(DoorwayError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };

            if let Some(account) = &ctx.account {
                ctx.user = match self.users.get_by_identity(account.id, identity.id).await {
                    Ok(user) if user.active => Some(user),
                    Ok(_) | Err(DoorwayError::NotFound { .. }) => None,
                    Err(e) => return Err(e),
                };
            }
            ctx.session = Some(session);
            ctx.identity = Some(identity);
            break;
        }

        Ok(ctx)
    }

    /// End the context's session, if any, and return a cookie that
    /// clears it for the same path.
    pub async fn sign_out(&self, ctx: &RequestContext) -> DoorwayResult<SessionCookie> {
        if let Some(session) = &ctx.session {
            self.sessions.invalidate(session.id).await?;
            tracing::info!(session_id = %session.id, "session ended");
        }
        let path = cookie::cookie_path(ctx.account.as_ref());
        Ok(SessionCookie::expired(&path, &self.config))
    }

    /// Token confirming ownership of the identity's email address.
    pub fn issue_email_verification(&self, identity: &Identity) -> DoorwayResult<String> {
        Ok(token::issue_token(
            TokenPurpose::EmailVerification,
            identity.id,
            None,
            &self.config,
            self.clock.now(),
        )?)
    }

    pub async fn verify_email_verification(&self, token: &str) -> DoorwayResult<Identity> {
        let claims = token::verify_token(
            token,
            TokenPurpose::EmailVerification,
            &self.config,
            self.clock.now(),
        )?;
        self.identities
            .get_by_id(claims.identity_id()?)
            .await
            .map_err(reject_missing)
    }

    /// Drop expired sessions and idle rate-limit entries.
    pub async fn prune(&self) -> DoorwayResult<u64> {
        self.limiter.cleanup();
        let removed = self.sessions.cleanup_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "expired sessions removed");
        }
        Ok(removed)
    }

    /// The identity a link for `email` should go to. Inside an account the
    /// identity also needs an active user there.
    async fn find_recipient(
        &self,
        email: &str,
        account_external_id: Option<u64>,
    ) -> DoorwayResult<Option<Identity>> {
        let identity = match self.identities.get_by_email(email).await {
            Ok(identity) => identity,
            Err(DoorwayError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(external_id) = account_external_id else {
            return Ok(Some(identity));
        };

        let account = match self.accounts.get_by_external_id(external_id).await {
            Ok(account) => account,
            Err(DoorwayError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        match self.users.get_by_identity(account.id, identity.id).await {
            Ok(user) if user.active => Ok(Some(identity)),
            Ok(_) | Err(DoorwayError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_or_create_identity(&self, email: &str) -> DoorwayResult<Identity> {
        match self.identities.get_by_email(email).await {
            Ok(identity) => return Ok(identity),
            Err(DoorwayError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let created = self
            .identities
            .create(CreateIdentity {
                email_address: email.to_string(),
            })
            .await;
        match created {
            Ok(identity) => {
                tracing::info!(identity_id = %identity.id, "identity created");
                Ok(identity)
            }
            // Lost a race with a concurrent sign-up.
            Err(DoorwayError::AlreadyExists { .. }) => self.identities.get_by_email(email).await,
            Err(e) => Err(e),
        }
    }

    fn queue_link(&self, request: LinkRequest) {
        if let Err(e) = self.deliveries.enqueue(request) {
            tracing::error!(error = %e, "magic link request dropped");
        }
    }

    fn build_delivery(
        &self,
        identity: &Identity,
        account_external_id: Option<u64>,
    ) -> DoorwayResult<MagicLinkDelivery> {
        let now = self.clock.now();
        let token = token::issue_token(
            TokenPurpose::MagicLink,
            identity.id,
            account_external_id,
            &self.config,
            now,
        )?;

        let prefix = account_external_id
            .map(|id| format!("/{id}"))
            .unwrap_or_default();
        let url = format!("{}{prefix}/session/magic_link/{token}", self.config.base_url);

        tracing::info!(
            identity_id = %identity.id,
            account = ?account_external_id,
            "magic link issued"
        );
        Ok(MagicLinkDelivery {
            identity_id: identity.id,
            email_address: identity.email_address.clone(),
            url,
            expires_at: now + Duration::seconds(self.config.magic_link_lifetime_secs as i64),
        })
    }
}

impl<I, A, U, S> LinkResolver for AuthService<I, A, U, S>
where
    I: IdentityRepository + 'static,
    A: AccountRepository + 'static,
    U: UserRepository + 'static,
    S: SessionRepository + 'static,
{
    async fn resolve(&self, request: &LinkRequest) -> DoorwayResult<Option<MagicLinkDelivery>> {
        self.resolve_link(request).await
    }
}

/// A record named by a valid token has gone away; treat the token as invalid.
fn reject_missing(err: DoorwayError) -> DoorwayError {
    match err {
        DoorwayError::NotFound { .. } => AuthError::InvalidOrExpiredToken.into(),
        other => other,
    }
}

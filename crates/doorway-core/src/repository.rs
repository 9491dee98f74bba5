//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Lookups that find nothing
//! return [`DoorwayError::NotFound`](crate::error::DoorwayError::NotFound).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DoorwayResult;
use crate::models::{
    account::{Account, CreateAccount},
    identity::{CreateIdentity, Identity},
    session::{CreateSession, Session},
    user::{CreateUser, UpdateUser, User},
};

// ---------------------------------------------------------------------------
// Identities & accounts (global scope)
// ---------------------------------------------------------------------------

pub trait IdentityRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email address is taken.
    fn create(&self, input: CreateIdentity)
    -> impl Future<Output = DoorwayResult<Identity>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = DoorwayResult<Identity>> + Send;
    /// `email_address` must already be normalized.
    fn get_by_email(
        &self,
        email_address: &str,
    ) -> impl Future<Output = DoorwayResult<Identity>> + Send;
}

pub trait AccountRepository: Send + Sync {
    fn create(&self, input: CreateAccount) -> impl Future<Output = DoorwayResult<Account>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = DoorwayResult<Account>> + Send;
    fn get_by_external_id(
        &self,
        external_id: u64,
    ) -> impl Future<Output = DoorwayResult<Account>> + Send;
    /// Accounts in which the identity has an active user.
    fn list_for_identity(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = DoorwayResult<Vec<Account>>> + Send;
}

// ---------------------------------------------------------------------------
// Account-scoped repositories
// ---------------------------------------------------------------------------

/// Creating or updating a user must also bump `updated_at` on the
/// owning identity and account.
pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = DoorwayResult<User>> + Send;
    fn get_by_id(
        &self,
        account_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = DoorwayResult<User>> + Send;
    fn get_by_identity(
        &self,
        account_id: Uuid,
        identity_id: Uuid,
    ) -> impl Future<Output = DoorwayResult<User>> + Send;
    /// Every user of the identity, active or not, oldest first.
    fn list_by_identity(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = DoorwayResult<Vec<User>>> + Send;
    fn update(
        &self,
        account_id: Uuid,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = DoorwayResult<User>> + Send;
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub trait SessionRepository: Send + Sync {
    /// Always inserts a new row.
    fn create(&self, input: CreateSession) -> impl Future<Output = DoorwayResult<Session>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = DoorwayResult<Session>> + Send;
    fn list_by_identity(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = DoorwayResult<Vec<Session>>> + Send;
    /// Delete a single session (sign out).
    fn invalidate(&self, id: Uuid) -> impl Future<Output = DoorwayResult<()>> + Send;
    /// Delete every session of an identity.
    fn invalidate_identity_sessions(
        &self,
        identity_id: Uuid,
    ) -> impl Future<Output = DoorwayResult<()>> + Send;
    /// Remove sessions whose expiry is at or before `now`; returns how many.
    fn cleanup_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = DoorwayResult<u64>> + Send;
}

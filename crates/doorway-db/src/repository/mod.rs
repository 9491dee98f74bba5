//! SurrealDB repository implementations.

mod account;
mod identity;
mod session;
mod user;

pub use account::SurrealAccountRepository;
pub use identity::SurrealIdentityRepository;
pub use session::SurrealSessionRepository;
pub use user::SurrealUserRepository;

use uuid::Uuid;

use crate::error::DbError;

fn parse_uuid(entity: &str, field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::invalid_row(entity, format!("{field}: {e}")))
}

//! SurrealDB implementation of [`IdentityRepository`].

use chrono::{DateTime, Utc};
use doorway_core::error::DoorwayResult;
use doorway_core::models::identity::{CreateIdentity, Identity};
use doorway_core::repository::IdentityRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct IdentityRow {
    email_address: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_identity(self, id: Uuid) -> Identity {
        Identity {
            id,
            email_address: self.email_address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct IdentityRowWithId {
    record_id: String,
    email_address: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRowWithId {
    fn try_into_identity(self) -> Result<Identity, DbError> {
        Ok(Identity {
            id: parse_uuid("identity", "id", &self.record_id)?,
            email_address: self.email_address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Identity repository.
#[derive(Clone)]
pub struct SurrealIdentityRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealIdentityRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> IdentityRepository for SurrealIdentityRepository<C> {
    async fn create(&self, input: CreateIdentity) -> DoorwayResult<Identity> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query("CREATE type::record('identity', $id) SET email_address = $email_address")
            .bind(("id", id_str.clone()))
            .bind(("email_address", input.email_address))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write("identity", e))?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: id_str,
        })?;

        Ok(row.into_identity(id))
    }

    async fn get_by_id(&self, id: Uuid) -> DoorwayResult<Identity> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('identity', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: id_str,
        })?;

        Ok(row.into_identity(id))
    }

    async fn get_by_email(&self, email_address: &str) -> DoorwayResult<Identity> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM identity \
                 WHERE email_address = $email_address",
            )
            .bind(("email_address", email_address.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRowWithId> = result.take(0).map_err(DbError::from)?;
        // The address stays out of the error so it never reaches the logs.
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: "email_address".into(),
        })?;

        Ok(row.try_into_identity()?)
    }
}

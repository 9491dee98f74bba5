//! SurrealDB implementation of [`AccountRepository`].

use chrono::{DateTime, Utc};
use doorway_core::error::DoorwayResult;
use doorway_core::models::account::{Account, CreateAccount};
use doorway_core::repository::AccountRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AccountRow {
    external_id: u64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self, id: Uuid) -> Account {
        Account {
            id,
            external_id: self.external_id,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct AccountRowWithId {
    record_id: String,
    external_id: u64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRowWithId {
    fn try_into_account(self) -> Result<Account, DbError> {
        Ok(Account {
            id: parse_uuid("account", "id", &self.record_id)?,
            external_id: self.external_id,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Account repository.
#[derive(Clone)]
pub struct SurrealAccountRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccountRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccountRepository for SurrealAccountRepository<C> {
    async fn create(&self, input: CreateAccount) -> DoorwayResult<Account> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('account', $id) SET \
                 external_id = $external_id, name = $name",
            )
            .bind(("id", id_str.clone()))
            .bind(("external_id", input.external_id))
            .bind(("name", input.name))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write("account", e))?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id))
    }

    async fn get_by_id(&self, id: Uuid) -> DoorwayResult<Account> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('account', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: id_str,
        })?;

        Ok(row.into_account(id))
    }

    async fn get_by_external_id(&self, external_id: u64) -> DoorwayResult<Account> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM account \
                 WHERE external_id = $external_id",
            )
            .bind(("external_id", external_id))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "account".into(),
            id: format!("external_id={external_id}"),
        })?;

        Ok(row.try_into_account()?)
    }

    async fn list_for_identity(&self, identity_id: Uuid) -> DoorwayResult<Vec<Account>> {
        let mut memberships = self
            .db
            .query(
                "SELECT VALUE account_id FROM user \
                 WHERE identity_id = $identity_id AND active = true",
            )
            .bind(("identity_id", identity_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let account_ids: Vec<String> = memberships.take(0).map_err(DbError::from)?;

        if account_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM account \
                 WHERE meta::id(id) INSIDE $account_ids \
                 ORDER BY external_id ASC",
            )
            .bind(("account_ids", account_ids))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let accounts = rows
            .into_iter()
            .map(AccountRowWithId::try_into_account)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(accounts)
    }
}

//! SurrealDB implementation of [`UserRepository`].
//!
//! Every write to a user also stamps `updated_at` on the owning identity
//! and account in the same transaction, so cached views keyed on either
//! parent go stale when a membership changes, and a rejected write
//! touches nothing.

use chrono::{DateTime, Utc};
use doorway_core::error::DoorwayResult;
use doorway_core::models::user::{CreateUser, UpdateUser, User, UserRole};
use doorway_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

const TOUCH_PARENTS: &str = "\
UPDATE type::record('identity', $identity_id) SET updated_at = time::now(); \
UPDATE type::record('account', $account_id) SET updated_at = time::now();";

/// `write` followed by the parent touches, all or nothing. Statement 0 of
/// the response is `write`.
fn with_touch(write: &str) -> String {
    format!("BEGIN TRANSACTION; {write}; {TOUCH_PARENTS} COMMIT TRANSACTION;")
}

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    account_id: String,
    identity_id: String,
    name: String,
    role: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    account_id: String,
    identity_id: String,
    name: String,
    role: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_role(s: &str) -> Result<UserRole, DbError> {
    match s {
        "Owner" => Ok(UserRole::Owner),
        "Admin" => Ok(UserRole::Admin),
        "Member" => Ok(UserRole::Member),
        other => Err(DbError::invalid_row("user", format!("unknown role: {other}"))),
    }
}

fn role_to_string(role: UserRole) -> &'static str {
    match role {
        UserRole::Owner => "Owner",
        UserRole::Admin => "Admin",
        UserRole::Member => "Member",
    }
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            account_id: parse_uuid("user", "account_id", &self.account_id)?,
            identity_id: parse_uuid("user", "identity_id", &self.identity_id)?,
            name: self.name,
            role: parse_role(&self.role)?,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = parse_uuid("user", "id", &self.record_id)?;
        UserRow {
            account_id: self.account_id,
            identity_id: self.identity_id,
            name: self.name,
            role: self.role,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_user(id)
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_by(
        &self,
        query: &'static str,
        bindings: Vec<(&'static str, String)>,
    ) -> Result<Vec<User>, DbError> {
        let mut builder = self.db.query(query);
        for binding in bindings {
            builder = builder.bind(binding);
        }
        let mut result = builder.await?;
        let rows: Vec<UserRowWithId> = result.take(0)?;
        rows.into_iter().map(UserRowWithId::try_into_user).collect()
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> DoorwayResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let query = with_touch(
            "CREATE type::record('user', $id) SET \
             account_id = $account_id, identity_id = $identity_id, \
             name = $name, role = $role, active = true",
        );

        let result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .bind(("account_id", input.account_id.to_string()))
            .bind(("identity_id", input.identity_id.to_string()))
            .bind(("name", input.name))
            .bind(("role", role_to_string(input.role).to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write("user", e))?;

        // Statement 0 is the CREATE; the rest touch the parents.
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, account_id: Uuid, id: Uuid) -> DoorwayResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('user', $id) \
                 WHERE account_id = $account_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("account_id", account_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_identity(&self, account_id: Uuid, identity_id: Uuid) -> DoorwayResult<User> {
        let users = self
            .select_by(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE account_id = $account_id AND identity_id = $identity_id",
                vec![
                    ("account_id", account_id.to_string()),
                    ("identity_id", identity_id.to_string()),
                ],
            )
            .await?;

        users.into_iter().next().ok_or_else(|| {
            DbError::NotFound {
                entity: "user".into(),
                id: format!("account={account_id},identity={identity_id}"),
            }
            .into()
        })
    }

    async fn list_by_identity(&self, identity_id: Uuid) -> DoorwayResult<Vec<User>> {
        Ok(self
            .select_by(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE identity_id = $identity_id \
                 ORDER BY created_at ASC",
                vec![("identity_id", identity_id.to_string())],
            )
            .await?)
    }

    async fn update(&self, account_id: Uuid, id: Uuid, input: UpdateUser) -> DoorwayResult<User> {
        let current = self.get_by_id(account_id, id).await?;
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.active.is_some() {
            sets.push("active = $active");
        }
        sets.push("updated_at = time::now()");

        let query = with_touch(&format!(
            "UPDATE type::record('user', $id) SET {}",
            sets.join(", ")
        ));

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("account_id", account_id.to_string()))
            .bind(("identity_id", current.identity_id.to_string()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(role) = input.role {
            builder = builder.bind(("role", role_to_string(role).to_string()));
        }
        if let Some(active) = input.active {
            builder = builder.bind(("active", active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_write("user", e))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }
}

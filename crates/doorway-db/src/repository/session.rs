//! SurrealDB implementation of [`SessionRepository`].

use chrono::{DateTime, Utc};
use doorway_core::error::DoorwayResult;
use doorway_core::models::session::{CreateSession, Session};
use doorway_core::repository::SessionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SessionRow {
    identity_id: String,
    active_user_id: Option<String>,
    user_agent: Option<String>,
    ip_address: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    identity_id: String,
    active_user_id: Option<String>,
    user_agent: Option<String>,
    ip_address: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self, id: Uuid) -> Result<Session, DbError> {
        let active_user_id = self
            .active_user_id
            .as_deref()
            .map(|v| parse_uuid("session", "active_user_id", v))
            .transpose()?;
        Ok(Session {
            id,
            identity_id: parse_uuid("session", "identity_id", &self.identity_id)?,
            active_user_id,
            user_agent: self.user_agent,
            ip_address: self.ip_address,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

impl SessionRowWithId {
    fn try_into_session(self) -> Result<Session, DbError> {
        let id = parse_uuid("session", "id", &self.record_id)?;
        SessionRow {
            identity_id: self.identity_id,
            active_user_id: self.active_user_id,
            user_agent: self.user_agent,
            ip_address: self.ip_address,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
        .into_session(id)
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the Session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, input: CreateSession) -> DoorwayResult<Session> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('session', $id) SET \
                 identity_id = $identity_id, \
                 active_user_id = $active_user_id, \
                 user_agent = $user_agent, \
                 ip_address = $ip_address, \
                 expires_at = $expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("identity_id", input.identity_id.to_string()))
            .bind(("active_user_id", input.active_user_id.map(|u| u.to_string())))
            .bind(("user_agent", input.user_agent))
            .bind(("ip_address", input.ip_address))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_write("session", e))?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        Ok(row.into_session(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> DoorwayResult<Session> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('session', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        Ok(row.into_session(id)?)
    }

    async fn list_by_identity(&self, identity_id: Uuid) -> DoorwayResult<Vec<Session>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE identity_id = $identity_id \
                 ORDER BY created_at ASC",
            )
            .bind(("identity_id", identity_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        let sessions = rows
            .into_iter()
            .map(SessionRowWithId::try_into_session)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(sessions)
    }

    async fn invalidate(&self, id: Uuid) -> DoorwayResult<()> {
        self.db
            .query("DELETE type::record('session', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn invalidate_identity_sessions(&self, identity_id: Uuid) -> DoorwayResult<()> {
        self.db
            .query("DELETE session WHERE identity_id = $identity_id")
            .bind(("identity_id", identity_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> DoorwayResult<u64> {
        // Count first, then delete, against the same cutoff.
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM session \
                 WHERE expires_at <= $now GROUP ALL",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE session WHERE expires_at <= $now")
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}

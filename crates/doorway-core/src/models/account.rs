//! Account (tenant) domain model.
//!
//! Every account is addressed by a numeric external id that appears as
//! the first path segment of its URLs (e.g. `/1234567/...`). Session
//! cookies issued inside an account are scoped to that segment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    /// Public numeric id used in URL paths.
    pub external_id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// The URL path prefix owned by this account, e.g. `/1234567`.
    pub fn path_prefix(&self) -> String {
        format!("/{}", self.external_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub external_id: u64,
    pub name: String,
}

//! Identity domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DoorwayError, DoorwayResult};

/// A person, identified by a unique normalized email address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    /// Always stored normalized, see [`normalize_email_address`].
    pub email_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdentity {
    pub email_address: String,
}

/// Trim and lowercase a free-text email address.
///
/// Rejects input without exactly one `@` separating two non-empty parts,
/// or with embedded whitespace.
pub fn normalize_email_address(raw: &str) -> DoorwayResult<String> {
    let normalized = raw.trim().to_lowercase();

    let invalid = || DoorwayError::Validation {
        message: "email address is invalid".into(),
    };

    if normalized.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = normalized.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    Ok(normalized)
}

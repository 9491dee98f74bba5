//! Database-specific error types and conversions.

use doorway_core::error::DoorwayError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique index violated on {entity}")]
    Duplicate { entity: String },

    #[error("Malformed {entity} row: {message}")]
    InvalidRow { entity: String, message: String },
}

impl DbError {
    /// Classify an error raised by a write statement. Unique index
    /// violations become [`DbError::Duplicate`].
    pub(crate) fn from_write(entity: &str, err: surrealdb::Error) -> Self {
        if err.to_string().contains("already contains") {
            DbError::Duplicate {
                entity: entity.into(),
            }
        } else {
            DbError::Surreal(err)
        }
    }

    pub(crate) fn invalid_row(entity: &str, message: impl std::fmt::Display) -> Self {
        DbError::InvalidRow {
            entity: entity.into(),
            message: message.to_string(),
        }
    }
}

impl From<DbError> for DoorwayError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => DoorwayError::NotFound { entity, id },
            DbError::Duplicate { entity } => DoorwayError::AlreadyExists { entity },
            other => DoorwayError::Database(other.to_string()),
        }
    }
}

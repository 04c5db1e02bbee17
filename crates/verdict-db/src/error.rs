//! Database-specific error types and conversions.

use verdict_core::error::VerdictError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique index violated: {entity}")]
    Duplicate { entity: String },

    #[error("Concurrent modification of {entity}")]
    Conflict { entity: String },
}

impl From<DbError> for VerdictError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => VerdictError::NotFound { entity, id },
            DbError::Duplicate { entity } => VerdictError::Duplicate { entity },
            DbError::Conflict { entity } => VerdictError::Conflict { entity },
            other => VerdictError::Database(other.to_string()),
        }
    }
}

/// Maps a raw SurrealDB error to `Duplicate` when the message indicates a
/// unique-index violation, preserving idempotent upsert semantics at the
/// service layer.
pub fn classify_write_error(entity: &str, err: surrealdb::Error) -> DbError {
    let message = err.to_string().to_lowercase();
    if message.contains("already contains") || message.contains("unique") {
        DbError::Duplicate {
            entity: entity.to_string(),
        }
    } else {
        DbError::Surreal(err)
    }
}

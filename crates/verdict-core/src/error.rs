//! Error types for the Verdict system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    Duplicate { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Business rule violated: {message}")]
    BusinessRule { message: String },

    #[error("Tenant isolation violated: {message}")]
    TenantIsolation { message: String },

    #[error("Concurrent modification of {entity}")]
    Conflict { entity: String },

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type VerdictResult<T> = Result<T, VerdictError>;

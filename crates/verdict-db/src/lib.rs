//! Verdict Database — SurrealDB connection management and repository
//! implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Repository implementations for `verdict-core` traits
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{
    SurrealCrossTenantAccessRepository, SurrealPermissionRepository, SurrealPolicyRepository,
    SurrealResourceRepository, SurrealRolePermissionRepository, SurrealRoleRepository,
    SurrealUserRoleRepository,
};
pub use schema::run_migrations;

//! Domain models for Verdict.
//!
//! All tenant-scoped models carry a `tenant_id`. Roles and policies may be
//! global (`tenant_id: None`) for system-wide definitions such as
//! `SUPER_ADMIN`. Free-form maps (conditions, attributes, constraints) are
//! `serde_json::Value` objects.

pub mod cross_tenant;
pub mod permission;
pub mod policy;
pub mod resource;
pub mod role;
pub mod role_permission;
pub mod user_role;

//! Verdict Core — domain models, repository contracts, and error types.
//!
//! This crate is dependency-light by design: it defines WHAT the
//! authorization service stores and the contracts the storage layer
//! implements, but contains no I/O of its own.

pub mod error;
pub mod models;
pub mod repository;

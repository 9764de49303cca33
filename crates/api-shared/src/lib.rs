//! # API Shared
//!
//! Shared request/response types and utilities for the PRM APIs.
//!
//! Contains:
//! - Wire types for errors, credentials, sessions and query strings (`dto` module)
//! - Shared services like `HealthService`
//! - Authentication utilities (bearer-token parsing)
//!
//! Used by `api-rest` and the `prm-run` binary for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use dto::*;
pub use health::{HealthRes, HealthService};

//! HTTP middleware components.

/// API token authentication middleware
pub mod auth;

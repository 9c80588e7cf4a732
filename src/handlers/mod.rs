//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, query)
//! 2. Calls into the key services
//! 3. Returns an HTTP response

/// Health check endpoint
pub mod health;
/// Redeem and self-service reset endpoints
pub mod holders;
/// Admin key management endpoints
pub mod keys;
/// Script delivery endpoint
pub mod loader;

//! Data models representing stored entities and API bodies.

/// Access key model
pub mod key;

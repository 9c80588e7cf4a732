//! Business logic services.
//!
//! Services contain the key lifecycle rules, separated from HTTP handlers.

pub mod access_gateway;
pub mod key_service;
pub mod pruner;

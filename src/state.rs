//! Shared state handed to every handler.

use std::sync::Arc;

use crate::{middleware::auth::hash_token, services::key_service::PrunePolicy, store::KeyStore};

/// Script body served when no `SCRIPT_PATH` is configured.
pub const DEFAULT_SCRIPT: &str = "print(\"This is a protected Lua script.\")\n";

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<KeyStore>,

    /// SHA-256 (hex) of the configured API token
    pub api_token_hash: Arc<str>,

    pub prune_policy: PrunePolicy,

    /// Body appended after the per-holder header on `/script.lua`
    pub script: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<KeyStore>, api_token: &str, prune_policy: PrunePolicy) -> Self {
        Self {
            store,
            api_token_hash: hash_token(api_token).into(),
            prune_policy,
            script: Arc::from(DEFAULT_SCRIPT),
        }
    }

    pub fn with_script(mut self, script: impl Into<Arc<str>>) -> Self {
        self.script = script.into();
        self
    }
}

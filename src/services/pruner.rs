//! Background task that prunes expired keys on a fixed interval.
//!
//! Runs independently of request traffic but goes through the same
//! `prune_expired` operation, and so the same store writer lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::services::key_service::{PrunePolicy, prune_expired};
use crate::store::KeyStore;

/// Prune forever, once per `every`. The first pass runs immediately.
pub async fn run_prune_loop(store: Arc<KeyStore>, every: Duration, policy: PrunePolicy) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Key pruner started (every {}s, policy {:?})",
        every.as_secs(),
        policy
    );

    loop {
        ticker.tick().await;
        prune_once(&store, policy).await;
    }
}

async fn prune_once(store: &KeyStore, policy: PrunePolicy) {
    match prune_expired(store, policy, Utc::now()).await {
        Ok(0) => debug!("Prune pass found no expired keys"),
        Ok(removed) => info!(removed, "Prune pass complete"),
        Err(e) => error!(error = %e, "Prune pass failed"),
    }
}

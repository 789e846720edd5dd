//! Cooldown manager
//!
//! Failures are counted per error kind in minute buckets. When a kind's
//! count reaches its allowed-fails threshold the deployment is marked as
//! cooling down until `now + cooldown_time`. The marker is created with
//! `set_if_absent`, so concurrent failures start at most one cooldown, and
//! it expires on its own.

use super::config::RouterConfig;
use super::error::ErrorKind;
use super::keys::{WindowKind, cooldown_key, cooldown_prefixes, failure_key};
use super::store::CounterStore;
use crate::utils::error::Result;
use crate::utils::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Failure observation window
const OBSERVATION_WINDOW: WindowKind = WindowKind::Rpm;

/// Tracks failures and cooldown state per deployment
pub struct CooldownManager {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    router_id: String,
}

impl std::fmt::Debug for CooldownManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownManager")
            .field("router_id", &self.router_id)
            .finish_non_exhaustive()
    }
}

impl CooldownManager {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, router_id: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            router_id: router_id.into(),
        }
    }

    /// Count a failure; returns true if it put the deployment into cooldown
    pub async fn record_failure(&self, deployment_id: &str, kind: ErrorKind, config: &RouterConfig) -> Result<bool> {
        let Some(allowed_fails) = config.allowed_fails_for(kind) else {
            debug!(
                "No allowed_fails threshold for {}; {} stays eligible",
                kind, deployment_id
            );
            return Ok(false);
        };
        let cooldown = config.cooldown_duration();
        if cooldown.is_zero() {
            return Ok(false);
        }

        let now_ms = self.clock.now_millis();
        let bucket = OBSERVATION_WINDOW.bucket(now_ms / 1000);
        let key = failure_key(&self.router_id, deployment_id, kind, bucket);
        let failures = self
            .store
            .increment(&key, 1, OBSERVATION_WINDOW.duration())
            .await?;

        if failures < i64::from(allowed_fails.max(1)) {
            debug!(
                "Deployment {} failure {}/{} ({})",
                deployment_id, failures, allowed_fails, kind
            );
            return Ok(false);
        }

        let expiry_ms = now_ms.saturating_add(u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX));
        let started = self
            .store
            .set_if_absent(
                &cooldown_key(&self.router_id, deployment_id),
                expiry_ms as i64,
                cooldown,
            )
            .await?;
        self.store.delete(&key).await?;

        if started {
            warn!(
                "Deployment {} cooling down for {:.1}s after {} {} failures",
                deployment_id,
                cooldown.as_secs_f64(),
                failures,
                kind
            );
        }
        Ok(started)
    }

    pub async fn is_cooling_down(&self, deployment_id: &str) -> Result<bool> {
        Ok(!self.cooldown_remaining(deployment_id).await?.is_zero())
    }

    /// Time left in the current cooldown, zero when not cooling down
    pub async fn cooldown_remaining(&self, deployment_id: &str) -> Result<Duration> {
        let expiry = self
            .store
            .get(&cooldown_key(&self.router_id, deployment_id))
            .await?;
        let remaining = expiry
            .map(|expiry_ms| (expiry_ms.max(0) as u64).saturating_sub(self.clock.now_millis()))
            .unwrap_or(0);
        Ok(Duration::from_millis(remaining))
    }

    /// Delete failure counts and cooldown state of a deployment
    pub async fn purge(&self, deployment_id: &str) -> Result<usize> {
        let mut removed = 0;
        for prefix in cooldown_prefixes(&self.router_id, deployment_id) {
            removed += self.store.delete_prefix(&prefix).await?;
        }
        if removed > 0 {
            info!("Cleared cooldown state of {}", deployment_id);
        }
        Ok(removed)
    }
}

//! Shared counter store
//!
//! Usage, cooldown and budget state all live behind [`CounterStore`], the
//! contract a backing store must satisfy so that several router processes
//! can share one view of deployment load. Two backends ship with the crate:
//! [`InMemoryCounterStore`] for a single process and, with the `redis`
//! feature, `RedisCounterStore`.
//!
//! ## Contract
//!
//! - Every operation is atomic per key. No operation spans keys.
//! - A key's TTL is fixed when the key is created and is not extended by
//!   later increments, so a bucket expires one window after it first saw
//!   traffic.
//! - A rejected `increment_and_check` leaves the stored value unchanged.

use super::keys::CounterKey;
use crate::utils::error::Result;
use crate::utils::time::Clock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Counter storage used by the usage tracker, cooldown manager and budgets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `amount` unless the result would exceed `limit`
    ///
    /// Returns the value after the operation and whether the increment was
    /// applied. On rejection the returned value is the unchanged current one.
    async fn increment_and_check(
        &self,
        key: &CounterKey,
        amount: i64,
        limit: i64,
        ttl: Duration,
    ) -> Result<(i64, bool)>;

    /// Add `amount` (which may be negative) and return the new value
    async fn increment(&self, key: &CounterKey, amount: i64, ttl: Duration) -> Result<i64>;

    /// Current value, `None` when absent or expired
    async fn get(&self, key: &CounterKey) -> Result<Option<i64>>;

    /// Overwrite the value and restart its TTL
    async fn set_with_ttl(&self, key: &CounterKey, value: i64, ttl: Duration) -> Result<()>;

    /// Create the key only when absent; returns whether this call created it
    async fn set_if_absent(&self, key: &CounterKey, value: i64, ttl: Duration) -> Result<bool>;

    /// Remove one key
    async fn delete(&self, key: &CounterKey) -> Result<()>;

    /// Remove every key starting with `prefix`; returns how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    /// Drop expired keys; returns how many were removed
    ///
    /// Stores with native expiry may treat this as a no-op.
    async fn purge_expired(&self) -> Result<usize>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at_ms: u64,
}

impl Entry {
    fn new(value: i64, now_ms: u64, ttl: Duration) -> Self {
        Self {
            value,
            expires_at_ms: now_ms.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Process-local counter store
///
/// Each key is updated under its DashMap shard lock, which makes
/// check-and-increment atomic per key without serializing unrelated keys.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored keys, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update<T>(&self, key: &CounterKey, ttl: Duration, f: impl FnOnce(&mut Entry) -> T) -> T {
        let now = self.clock.now_millis();
        let mut slot = self
            .entries
            .entry(key.as_str().to_string())
            .or_insert_with(|| Entry::new(0, now, ttl));
        if !slot.is_live(now) {
            *slot = Entry::new(0, now, ttl);
        }
        f(slot.value_mut())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_check(
        &self,
        key: &CounterKey,
        amount: i64,
        limit: i64,
        ttl: Duration,
    ) -> Result<(i64, bool)> {
        Ok(self.update(key, ttl, |entry| {
            let next = entry.value.saturating_add(amount);
            if next > limit {
                (entry.value, false)
            } else {
                entry.value = next;
                (next, true)
            }
        }))
    }

    async fn increment(&self, key: &CounterKey, amount: i64, ttl: Duration) -> Result<i64> {
        Ok(self.update(key, ttl, |entry| {
            entry.value = entry.value.saturating_add(amount);
            entry.value
        }))
    }

    async fn get(&self, key: &CounterKey) -> Result<Option<i64>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .get(key.as_str())
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn set_with_ttl(&self, key: &CounterKey, value: i64, ttl: Duration) -> Result<()> {
        let now = self.clock.now_millis();
        self.entries
            .insert(key.as_str().to_string(), Entry::new(value, now, ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &CounterKey, value: i64, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let mut created = false;
        let mut slot = self
            .entries
            .entry(key.as_str().to_string())
            .or_insert_with(|| {
                created = true;
                Entry::new(value, now, ttl)
            });
        if !created && !slot.is_live(now) {
            *slot = Entry::new(value, now, ttl);
            created = true;
        }
        Ok(created)
    }

    async fn delete(&self, key: &CounterKey) -> Result<()> {
        self.entries.remove(key.as_str());
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

//! Live per-deployment metrics
//!
//! Process-local counters feeding the least-busy and latency-based
//! strategies. All updates are lock-free atomics with `Relaxed` ordering;
//! strategies tolerate slightly stale values.

use super::deployment::DeploymentId;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Runtime counters for one deployment
#[derive(Debug, Default)]
pub struct DeploymentMetrics {
    /// Calls dispatched and not yet completed
    pub in_flight: AtomicU32,
    /// Latency moving average in microseconds
    pub avg_latency_us: AtomicU64,
    /// Latency samples folded into the average
    pub latency_samples: AtomicU64,
    /// Successful calls (lifetime)
    pub successes: AtomicU64,
    /// Failed calls (lifetime)
    pub failures: AtomicU64,
}

impl DeploymentMetrics {
    /// Fold a latency sample into the moving average (alpha = 0.2)
    pub fn record_latency(&self, latency_us: u64) {
        let current_avg = self.avg_latency_us.load(Ordering::Relaxed);
        let new_avg = if self.latency_samples.load(Ordering::Relaxed) == 0 {
            latency_us
        } else {
            // EMA: new_avg = alpha * new_value + (1 - alpha) * old_avg, alpha = 1/5
            (latency_us + 4 * current_avg) / 5
        };
        self.avg_latency_us.store(new_avg, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight.load(Ordering::Relaxed),
            avg_latency_us: self.avg_latency_us.load(Ordering::Relaxed),
            latency_samples: self.latency_samples.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`DeploymentMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub in_flight: u32,
    pub avg_latency_us: u64,
    pub latency_samples: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Metrics for every deployment a router has dispatched to
#[derive(Debug, Default)]
pub struct LiveMetrics {
    deployments: DashMap<DeploymentId, Arc<DeploymentMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Arc<DeploymentMetrics> {
        if let Some(metrics) = self.deployments.get(id) {
            return metrics.clone();
        }
        self.deployments
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Current counters, zeros for unseen deployments
    pub fn snapshot(&self, id: &str) -> MetricsSnapshot {
        self.deployments
            .get(id)
            .map(|m| m.snapshot())
            .unwrap_or_default()
    }

    pub fn in_flight(&self, id: &str) -> u32 {
        self.deployments
            .get(id)
            .map(|m| m.in_flight.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Reserve an in-flight slot unless `max` are already taken
    pub fn try_begin(&self, id: &str, max: Option<u32>) -> bool {
        let metrics = self.entry(id);
        metrics
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .is_ok()
    }

    /// Hand a slot taken by [`try_begin`](Self::try_begin) to a guard that releases it on drop
    pub fn hold<'a>(&'a self, id: &'a str) -> InFlightSlot<'a> {
        InFlightSlot { metrics: self, id }
    }

    /// Release an in-flight slot
    pub fn end(&self, id: &str) {
        if let Some(metrics) = self.deployments.get(id) {
            let _ = metrics
                .in_flight
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    current.checked_sub(1)
                });
        }
    }

    pub fn record_success(&self, id: &str, latency_us: u64) {
        let metrics = self.entry(id);
        metrics.successes.fetch_add(1, Ordering::Relaxed);
        metrics.record_latency(latency_us);
    }

    pub fn record_failure(&self, id: &str) {
        self.entry(id).failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop all metrics for a removed deployment
    pub fn remove(&self, id: &str) {
        self.deployments.remove(id);
    }
}

/// An in-flight slot released when dropped, including when the owning future is cancelled
#[must_use = "dropping the slot releases it immediately"]
#[derive(Debug)]
pub struct InFlightSlot<'a> {
    metrics: &'a LiveMetrics,
    id: &'a str,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.metrics.end(self.id);
    }
}

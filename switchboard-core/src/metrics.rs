//! Metrics sinks for repair outcomes and retry counts

use crate::repair::{JsonRepairAttempt, RepairOutcome};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives repair outcomes and retry counts.
///
/// Implementations must be cheap and must not fail; callers never wait on
/// them and ignore whatever they do.
pub trait MetricsSink: Send + Sync {
    fn record_repair(&self, attempt: &JsonRepairAttempt);

    /// `retries` is the number of attempts beyond the first
    fn record_retries(&self, provider: &str, retries: u32);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record_repair(&self, _attempt: &JsonRepairAttempt) {}

    fn record_retries(&self, _provider: &str, _retries: u32) {}
}

/// Point-in-time copy of [`InMemoryMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub repairs_succeeded: u64,
    pub repairs_failed: u64,
    pub repairs_short_circuited: u64,
    pub repair_time_us: u64,
    pub retries: u64,
    pub strategy_hits: HashMap<String, u64>,
    pub retries_by_provider: HashMap<String, u64>,
}

/// Counters kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    repairs_succeeded: AtomicU64,
    repairs_failed: AtomicU64,
    repairs_short_circuited: AtomicU64,
    repair_time_us: AtomicU64,
    retries: AtomicU64,
    strategy_hits: Mutex<HashMap<String, u64>>,
    retries_by_provider: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            repairs_succeeded: self.repairs_succeeded.load(Ordering::Relaxed),
            repairs_failed: self.repairs_failed.load(Ordering::Relaxed),
            repairs_short_circuited: self.repairs_short_circuited.load(Ordering::Relaxed),
            repair_time_us: self.repair_time_us.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            strategy_hits: self.strategy_hits.lock().clone(),
            retries_by_provider: self.retries_by_provider.lock().clone(),
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_repair(&self, attempt: &JsonRepairAttempt) {
        self.repair_time_us
            .fetch_add(attempt.elapsed.as_micros() as u64, Ordering::Relaxed);

        match &attempt.outcome {
            RepairOutcome::Repaired { strategy } => {
                self.repairs_succeeded.fetch_add(1, Ordering::Relaxed);
                *self
                    .strategy_hits
                    .lock()
                    .entry((*strategy).to_string())
                    .or_insert(0) += 1;
            }
            RepairOutcome::Unrepaired => {
                self.repairs_failed.fetch_add(1, Ordering::Relaxed);
            }
            RepairOutcome::ShortCircuited => {
                self.repairs_short_circuited.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_retries(&self, provider: &str, retries: u32) {
        if retries == 0 {
            return;
        }
        self.retries.fetch_add(u64::from(retries), Ordering::Relaxed);
        *self
            .retries_by_provider
            .lock()
            .entry(provider.to_string())
            .or_insert(0) += u64::from(retries);
    }
}

//! Best-effort repair of malformed JSON emitted by models
//!
//! Tool-call arguments produced by models are sometimes almost JSON:
//! trailing commas, Python literals, two objects glued together. The
//! engine runs an ordered list of rewrite strategies until the text parses.
//! It never fails; text it cannot fix comes back unchanged, and a shared
//! circuit breaker caps how much repair work runs per window.

pub mod breaker;
pub mod strategies;

pub use breaker::{CircuitBreakerState, RepairCircuitBreaker};
pub use strategies::{default_strategies, RepairStrategy};

use crate::config::RepairConfig;
use crate::metrics::{MetricsSink, NullMetrics};
use crate::protocol::{ToolCall, ToolCallDelta};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// How a repair call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
    Repaired { strategy: &'static str },
    Unrepaired,
    ShortCircuited,
}

/// Record of one repair call, handed to the metrics sink
#[derive(Debug, Clone, Serialize)]
pub struct JsonRepairAttempt {
    pub input: String,
    pub strategies_attempted: Vec<&'static str>,
    pub outcome: RepairOutcome,
    pub elapsed: Duration,
}

pub struct JsonRepairEngine {
    strategies: Vec<RepairStrategy>,
    breaker: Arc<RepairCircuitBreaker>,
    metrics: Arc<dyn MetricsSink>,
    invocations: AtomicU64,
}

impl std::fmt::Debug for JsonRepairEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRepairEngine")
            .field("strategies", &self.strategies.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("breaker", &self.breaker)
            .field("invocations", &self.invocations)
            .finish()
    }
}

impl Default for JsonRepairEngine {
    fn default() -> Self {
        Self::new(Arc::new(RepairCircuitBreaker::default()), Arc::new(NullMetrics))
    }
}

impl JsonRepairEngine {
    pub fn new(breaker: Arc<RepairCircuitBreaker>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            strategies: default_strategies(),
            breaker,
            metrics,
            invocations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RepairConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self::new(Arc::new(RepairCircuitBreaker::from_config(config)), metrics)
    }

    /// Replace the strategy list
    pub fn with_strategies(mut self, strategies: Vec<RepairStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Same strategies and shared breaker, reporting to `metrics`
    pub fn with_metrics_sink(&self, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            strategies: self.strategies.clone(),
            breaker: Arc::clone(&self.breaker),
            metrics,
            invocations: AtomicU64::new(0),
        }
    }

    pub fn breaker(&self) -> &Arc<RepairCircuitBreaker> {
        &self.breaker
    }

    /// Total strategy functions run by this engine
    pub fn strategy_invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Repair `input` into parseable JSON, or return it unchanged.
    ///
    /// Already-valid JSON is returned as is without touching the breaker.
    pub fn repair(&self, input: &str) -> String {
        if is_valid(input) {
            return input.to_string();
        }

        let started = Instant::now();

        if !self.breaker.try_acquire() {
            self.metrics.record_repair(&JsonRepairAttempt {
                input: input.to_string(),
                strategies_attempted: Vec::new(),
                outcome: RepairOutcome::ShortCircuited,
                elapsed: started.elapsed(),
            });
            return input.to_string();
        }

        let mut attempted = Vec::with_capacity(self.strategies.len());
        let mut current = input.to_string();
        let mut outcome = RepairOutcome::Unrepaired;

        for strategy in &self.strategies {
            attempted.push(strategy.name);
            self.invocations.fetch_add(1, Ordering::Relaxed);

            if let Some(rewritten) = (strategy.apply)(&current) {
                current = rewritten;
                if is_valid(&current) {
                    outcome = RepairOutcome::Repaired {
                        strategy: strategy.name,
                    };
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        self.breaker.record_elapsed(elapsed);
        debug!(
            outcome = ?outcome,
            strategies = attempted.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "json repair finished"
        );

        let repaired = matches!(outcome, RepairOutcome::Repaired { .. });
        self.metrics.record_repair(&JsonRepairAttempt {
            input: input.to_string(),
            strategies_attempted: attempted,
            outcome,
            elapsed,
        });

        if repaired {
            current
        } else {
            input.to_string()
        }
    }

    /// Repair the arguments of complete tool calls in place
    pub fn repair_tool_calls(&self, calls: &mut [ToolCall]) {
        for call in calls {
            if call.function.arguments.trim().is_empty() {
                continue;
            }
            let repaired = self.repair(&call.function.arguments);
            if repaired != call.function.arguments {
                debug!(tool = %call.function.name, "repaired tool call arguments");
                call.function.arguments = repaired;
            }
        }
    }

    /// Same as [`repair_tool_calls`](Self::repair_tool_calls) for stream
    /// deltas that carry a whole call
    pub fn repair_tool_call_deltas(&self, deltas: &mut [ToolCallDelta]) {
        for delta in deltas {
            let Some(arguments) = delta
                .function
                .as_mut()
                .and_then(|f| f.arguments.as_mut())
            else {
                continue;
            };
            if arguments.trim().is_empty() {
                continue;
            }
            let repaired = self.repair(arguments);
            if repaired != *arguments {
                *arguments = repaired;
            }
        }
    }
}

fn is_valid(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

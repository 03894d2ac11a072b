//! Pipeline statistics for mqtt2influx
//!
//! Counters updated by the consumer loop and exposed through `GET /stats`.
//!
//! # Counters
//!
//! - `received` - messages taken from the queue
//! - `records` - records built by the rule engine
//! - `written` - records accepted by the sink
//! - `write_failures` - records the sink rejected
//! - `suppressed` - records of rules with `disable_write`
//! - `rejected` - rules whose token rules rejected a topic
//! - `skipped_retained` - rules skipped for retained messages
//! - `build_failures` - rules whose record could not be built
//! - `errors` - messages aborted by an unexpected failure

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::transformer::{DispatchReport, WriteSummary};

/// Thread-safe counter using atomic operations
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter initialized to 0
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset the counter to 0
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Per-rule counts, keyed by the rule's topic pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    pub records: u64,
    pub write_failures: u64,
}

/// Consumer loop statistics
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: Counter,
    pub records: Counter,
    pub written: Counter,
    pub write_failures: Counter,
    pub suppressed: Counter,
    pub rejected: Counter,
    pub skipped_retained: Counter,
    pub build_failures: Counter,
    pub errors: Counter,
    /// Unix seconds of the last processed message, 0 before the first
    last_message_at: AtomicU64,
    rules: RwLock<HashMap<String, RuleStats>>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one dispatched message
    pub fn record_dispatch(&self, report: &DispatchReport) {
        self.records.inc_by(report.records as u64);
        self.rejected.inc_by(report.rejected as u64);
        self.skipped_retained.inc_by(report.skipped_retained as u64);
        self.build_failures.inc_by(report.failed as u64);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_message_at.store(now, Ordering::Relaxed);
    }

    /// Account for the writes of one message
    pub fn record_writes(&self, summary: &WriteSummary) {
        self.written.inc_by(summary.written as u64);
        self.write_failures.inc_by(summary.failed as u64);
        self.suppressed.inc_by(summary.suppressed as u64);
    }

    /// Record a built record for a rule
    pub fn record_rule(&self, rule: &str, write_failed: bool) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let stats = rules.entry(rule.to_string()).or_default();
        stats.records += 1;
        if write_failed {
            stats.write_failures += 1;
        }
    }

    /// Counts for one rule
    pub fn rule(&self, rule: &str) -> RuleStats {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules.get(rule).copied().unwrap_or_default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);

        StatsSnapshot {
            received: self.received.get(),
            records: self.records.get(),
            written: self.written.get(),
            write_failures: self.write_failures.get(),
            suppressed: self.suppressed.get(),
            rejected: self.rejected.get(),
            skipped_retained: self.skipped_retained.get(),
            build_failures: self.build_failures.get(),
            errors: self.errors.get(),
            last_message_at: match self.last_message_at.load(Ordering::Relaxed) {
                0 => None,
                ts => Some(ts),
            },
            rules: rules.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

/// Serializable view of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub records: u64,
    pub written: u64,
    pub write_failures: u64,
    pub suppressed: u64,
    pub rejected: u64,
    pub skipped_retained: u64,
    pub build_failures: u64,
    pub errors: u64,
    pub last_message_at: Option<u64>,
    pub rules: BTreeMap<String, RuleStats>,
}

//! Metrics for workspace operations and the remote calls behind them.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Counters shared by one aggregator instance.
pub struct AggregatorMetrics {
    // Remote call metrics
    remote_calls: AtomicU64,
    remote_failures: AtomicU64,

    // Fan-out metrics
    branch_failures: AtomicU64,

    // Operation metrics
    active_operations: AtomicU64,
    failed_operations: AtomicU64,
    operation_latencies: DashMap<&'static str, LatencyStats>,
}

impl AggregatorMetrics {
    pub fn new() -> Self {
        Self {
            remote_calls: AtomicU64::new(0),
            remote_failures: AtomicU64::new(0),
            branch_failures: AtomicU64::new(0),
            active_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            operation_latencies: DashMap::new(),
        }
    }

    /// Record a call that reached the workspace client (a cache miss).
    pub fn record_remote_call(&self, success: bool) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.remote_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_branch_failure(&self) {
        self.branch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation_start(&self) {
        self.active_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation_end(&self, operation: &'static str, success: bool, duration_ms: u64) {
        self.active_operations.fetch_sub(1, Ordering::Relaxed);
        if !success {
            self.failed_operations.fetch_add(1, Ordering::Relaxed);
        }
        self.operation_latencies
            .entry(operation)
            .or_insert_with(LatencyStats::new)
            .record(duration_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut operations: Vec<OperationSnapshot> = self
            .operation_latencies
            .iter()
            .map(|entry| OperationSnapshot {
                operation: *entry.key(),
                latency: entry.value().snapshot(),
            })
            .collect();
        operations.sort_by_key(|op| op.operation);

        MetricsSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            branch_failures: self.branch_failures.load(Ordering::Relaxed),
            active_operations: self.active_operations.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
            operations,
        }
    }
}

impl Default for AggregatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-operation latency statistics.
struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);

        LatencySnapshot {
            count,
            avg_ms: if count > 0 { total / count } else { 0 },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub remote_calls: u64,
    pub remote_failures: u64,
    pub branch_failures: u64,
    pub active_operations: u64,
    pub failed_operations: u64,
    pub operations: Vec<OperationSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub operation: &'static str,
    pub latency: LatencySnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: u64,
    pub max_ms: u64,
}

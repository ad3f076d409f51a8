use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Workflow engine counters
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub transitions: AtomicU64,
    pub version_bumps: AtomicU64,
    pub cascade_resets: AtomicU64,
    pub conflicts: AtomicU64,
    pub side_effect_failures: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_version_bump(&self) {
        self.version_bumps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cascade_resets(&self, count: usize) {
        self.cascade_resets.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        warn!("Concurrent modification rejected by conditional write");
    }

    pub fn record_side_effect_failure(&self, collaborator: &str) {
        self.side_effect_failures.fetch_add(1, Ordering::Relaxed);
        warn!(collaborator = collaborator, "Best-effort side effect failed");
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            transitions: self.transitions.load(Ordering::Relaxed),
            version_bumps: self.version_bumps.load(Ordering::Relaxed),
            cascade_resets: self.cascade_resets.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            side_effect_failures: self.side_effect_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            transitions = stats.transitions,
            version_bumps = stats.version_bumps,
            cascade_resets = stats.cascade_resets,
            conflicts = stats.conflicts,
            side_effect_failures = stats.side_effect_failures,
            "Workflow metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStats {
    pub transitions: u64,
    pub version_bumps: u64,
    pub cascade_resets: u64,
    pub conflicts: u64,
    pub side_effect_failures: u64,
}

/// Global metrics instance
static WORKFLOW_METRICS: std::sync::LazyLock<WorkflowMetrics> =
    std::sync::LazyLock::new(WorkflowMetrics::new);

pub fn workflow_metrics() -> &'static WorkflowMetrics {
    &WORKFLOW_METRICS
}

/// Time an operation and log its duration when dropped or finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
    finished: bool,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn finish(mut self) {
        self.log();
    }

    fn log(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        info!(
            operation = %self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.log();
    }
}

#[macro_export]
macro_rules! time_operation {
    ($operation:expr) => {
        let _timer = $crate::observability::OperationTimer::new($operation);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = WorkflowMetrics::new();
        metrics.record_transition();
        metrics.record_transition();
        metrics.record_version_bump();
        metrics.record_cascade_resets(3);
        metrics.record_side_effect_failure("activity");

        let stats = metrics.get_stats();
        assert_eq!(stats.transitions, 2);
        assert_eq!(stats.version_bumps, 1);
        assert_eq!(stats.cascade_resets, 3);
        assert_eq!(stats.conflicts, 0);
        assert_eq!(stats.side_effect_failures, 1);
    }

    #[test]
    fn test_timer_finishes_once() {
        let timer = OperationTimer::new("update_stage");
        timer.finish();
        crate::time_operation!("list_show_sets");
    }
}

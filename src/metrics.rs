//! Request log, aggregation, and final results.

use crate::error::MetricsError;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How a single request ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success { status: u16 },
    Failure { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// One completed request. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResult {
    /// Milliseconds since the collector was created.
    pub offset_ms: u64,
    pub task: String,
    pub endpoint: String,
    pub duration_us: u64,
    pub outcome: Outcome,
}

/// Append-only request log shared by every virtual user.
///
/// `record` is safe under unsynchronized concurrent callers; no ordering is
/// assumed between users. The log is never evicted for the run's lifetime.
pub struct MetricsCollector {
    log: Mutex<Vec<RequestResult>>,
    users_started: AtomicU64,
    users_stopped: AtomicU64,
    started_at: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            users_started: AtomicU64::new(0),
            users_stopped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Milliseconds elapsed since collection began.
    pub fn offset_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Append one result.
    pub fn record(&self, result: RequestResult) {
        self.log.lock().expect("metrics log poisoned").push(result);
    }

    /// Number of results recorded so far.
    pub fn len(&self) -> usize {
        self.log.lock().expect("metrics log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the log, e.g. at the end of a warmup window.
    pub fn reset(&self) {
        self.log.lock().expect("metrics log poisoned").clear();
    }

    pub fn user_started(&self, id: u32) {
        self.users_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(user = id, "virtual user started");
    }

    pub fn user_stopped(&self, id: u32) {
        self.users_stopped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(user = id, "virtual user stopped");
    }

    /// Copy of the current log, for export.
    pub fn log_snapshot(&self) -> Result<Vec<RequestResult>, MetricsError> {
        let log = self
            .log
            .lock()
            .map_err(|e| MetricsError::LogUnreadable(e.to_string()))?;
        Ok(log.clone())
    }

    /// Compute aggregates over the current log. The lock is held only for
    /// this pass; writers queue behind it but are never starved.
    pub fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        let log = self
            .log
            .lock()
            .map_err(|e| MetricsError::LogUnreadable(e.to_string()))?;

        let mut histogram = Histogram::<u64>::new(3).expect("Failed to create histogram");
        let mut success = 0u64;
        let mut failure = 0u64;
        let mut per_task: BTreeMap<String, TaskStats> = BTreeMap::new();

        for result in log.iter() {
            let entry = per_task.entry(result.task.clone()).or_default();
            entry.count += 1;
            match &result.outcome {
                Outcome::Success { .. } => {
                    success += 1;
                    entry.success += 1;
                    histogram
                        .record(result.duration_us)
                        .map_err(|_| MetricsError::LatencyOutOfRange(result.duration_us))?;
                }
                Outcome::Failure { .. } => {
                    failure += 1;
                    entry.failure += 1;
                }
            }
        }

        Ok(MetricsSnapshot {
            count: log.len() as u64,
            success_count: success,
            failure_count: failure,
            latency: LatencySummary::from_histogram(&histogram),
            per_task,
            users_started: self.users_started.load(Ordering::Relaxed),
            users_stopped: self.users_stopped.load(Ordering::Relaxed),
        })
    }

    /// Generate final test results from the current log.
    pub fn results(
        &self,
        name: String,
        users: u32,
        elapsed: Duration,
    ) -> Result<TestResults, MetricsError> {
        let snapshot = self.snapshot()?;
        let elapsed_secs = elapsed.as_secs_f64();
        let rps = if elapsed_secs > 0.0 {
            snapshot.count as f64 / elapsed_secs
        } else {
            0.0
        };

        Ok(TestResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            name,
            users,
            duration_secs: elapsed_secs,
            total_requests: snapshot.count,
            successful_requests: snapshot.success_count,
            failed_requests: snapshot.failure_count,
            requests_per_second: rps,
            latency: snapshot.latency,
            per_task: snapshot.per_task,
            git_info: GitInfo::capture(),
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task request counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub count: u64,
    pub success: u64,
    pub failure: u64,
}

/// Latency aggregates in milliseconds, over successful requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p75_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        Self {
            p50_ms: histogram.value_at_percentile(50.0) as f64 / 1000.0,
            p75_ms: histogram.value_at_percentile(75.0) as f64 / 1000.0,
            p90_ms: histogram.value_at_percentile(90.0) as f64 / 1000.0,
            p95_ms: histogram.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: histogram.value_at_percentile(99.0) as f64 / 1000.0,
            min_ms: histogram.min() as f64 / 1000.0,
            max_ms: histogram.max() as f64 / 1000.0,
            mean_ms: histogram.mean() / 1000.0,
        }
    }
}

/// Point-in-time aggregate view of the log. Derived, never mutated directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub latency: LatencySummary,
    pub per_task: BTreeMap<String, TaskStats>,
    pub users_started: u64,
    pub users_stopped: u64,
}

/// Final test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub timestamp: String,
    pub name: String,
    pub users: u32,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub per_task: BTreeMap<String, TaskStats>,

    // Git metadata for comparing exported runs across code changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_info: Option<GitInfo>,
}

/// Git state captured at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitInfo {
    pub commit: String,
    pub branch: String,
    pub dirty: bool,
}

impl GitInfo {
    /// Capture the current repository state, if running inside one.
    pub fn capture() -> Option<Self> {
        let git = |args: &[&str]| -> Option<String> {
            let output = std::process::Command::new("git").args(args).output().ok()?;
            if !output.status.success() {
                return None;
            }
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        };

        let commit = git(&["rev-parse", "--short", "HEAD"])?;
        let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .unwrap_or_else(|| "unknown".to_string());
        let dirty = git(&["status", "--porcelain"])
            .map(|s| !s.is_empty())
            .unwrap_or(false);

        Some(Self {
            commit,
            branch,
            dirty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(task: &str, duration_us: u64) -> RequestResult {
        RequestResult {
            offset_ms: 0,
            task: task.to_string(),
            endpoint: format!("/{task}"),
            duration_us,
            outcome: Outcome::Success { status: 200 },
        }
    }

    fn failure(task: &str, reason: &str) -> RequestResult {
        RequestResult {
            offset_ms: 0,
            task: task.to_string(),
            endpoint: format!("/{task}"),
            duration_us: 0,
            outcome: Outcome::Failure {
                reason: reason.to_string(),
            },
        }
    }

    #[test]
    fn test_record_is_visible_in_next_snapshot() {
        let metrics = MetricsCollector::new();
        metrics.record(success("a", 1_000));
        let snapshot = metrics.snapshot().unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[test]
    fn test_failures_counted_separately() {
        let metrics = MetricsCollector::new();
        metrics.record(success("a", 1_000));
        metrics.record(failure("a", "HTTP 503"));
        metrics.record(failure("b", "connection refused"));
        let snapshot = metrics.snapshot().unwrap();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.failure_count, 2);
        assert_eq!(snapshot.per_task["a"].failure, 1);
        assert_eq!(snapshot.per_task["b"].count, 1);
    }

    #[test]
    fn test_latency_summary_bounds() {
        let metrics = MetricsCollector::new();
        for us in (1_000..=10_000).step_by(1_000) {
            metrics.record(success("a", us));
        }
        let snapshot = metrics.snapshot().unwrap();
        let latency = &snapshot.latency;
        assert!((latency.min_ms - 1.0).abs() < 0.1);
        assert!((latency.max_ms - 10.0).abs() < 0.1);
        assert!(latency.p50_ms >= latency.min_ms && latency.p50_ms <= latency.max_ms);
        assert!(latency.p99_ms >= latency.p50_ms);
    }

    #[test]
    fn test_reset_clears_log() {
        let metrics = MetricsCollector::new();
        metrics.record(success("a", 1_000));
        metrics.reset();
        assert!(metrics.is_empty());
        assert_eq!(metrics.snapshot().unwrap().count, 0);
    }

    #[test]
    fn test_lifecycle_counters() {
        let metrics = MetricsCollector::new();
        metrics.user_started(0);
        metrics.user_started(1);
        metrics.user_stopped(0);
        let snapshot = metrics.snapshot().unwrap();
        assert_eq!(snapshot.users_started, 2);
        assert_eq!(snapshot.users_stopped, 1);
    }

    #[test]
    fn test_results_rps() {
        let metrics = MetricsCollector::new();
        for _ in 0..10 {
            metrics.record(success("a", 1_000));
        }
        let results = metrics
            .results("t".to_string(), 1, Duration::from_secs(2))
            .unwrap();
        assert!((results.requests_per_second - 5.0).abs() < 1e-9);
        assert_eq!(results.total_requests, 10);
    }
}

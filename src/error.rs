//! Error types for the load generator.

use thiserror::Error;

/// Configuration problems. All of these are fatal and surface before any
/// virtual user starts; steady-state execution never sees them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Task set is empty")]
    EmptyTaskSet,

    #[error("Task '{0}' has zero weight")]
    ZeroWeight(String),

    #[error("Task weights overflow a 64-bit total")]
    WeightOverflow,

    #[error("Invalid wait range: {0}")]
    InvalidWaitRange(String),

    #[error("Invalid base URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Task '{name}' path must start with '/', got '{path}'")]
    InvalidTaskPath { name: String, path: String },

    #[error("User count must be > 0")]
    ZeroUsers,

    #[error("Spawn rate must be a positive, finite number")]
    InvalidSpawnRate,

    #[error("No stop condition: set duration_secs and/or max_requests")]
    NoStopCondition,

    #[error("duration_secs must be > 0 when set")]
    ZeroDuration,

    #[error("max_requests must be > 0 when set")]
    ZeroMaxRequests,
}

/// Aggregation failures. The request log is append-only and these should not
/// occur in practice; when they do, `snapshot()` fails loudly instead of
/// returning misleading statistics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Metrics log is unreadable: {0}")]
    LogUnreadable(String),

    #[error("Latency value {0}us is outside the recordable range")]
    LatencyOutOfRange(u64),
}

//! Small purpose-built HTTP load generator.
//!
//! N concurrent virtual users each loop through the same schedule: pick a
//! weighted task, issue one GET, record the outcome, sleep a randomized
//! interval. Results aggregate into a latency/throughput summary at run end.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use client::{FetchOutcome, HttpClient, ReqwestClient};
pub use config::{TaskConfig, TestConfig, WaitRange};
pub use error::{ConfigError, MetricsError};
pub use metrics::{MetricsCollector, MetricsSnapshot, Outcome, RequestResult, TestResults};
pub use pool::{PoolOptions, StopHandle, StopPlan, VirtualUserPool};
pub use report::ResultsReport;
pub use runner::LoadRunner;
pub use scheduler::{TaskDefinition, TaskScheduler};

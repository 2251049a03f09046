//! Scenario configuration loading and validation.

use crate::error::ConfigError;
use crate::scheduler::TaskDefinition;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main test configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub users: u32,
    /// Users started per second during ramp-up.
    #[serde(default = "default_spawn_rate")]
    pub spawn_rate: f64,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Total request budget shared across all users.
    #[serde(default)]
    pub max_requests: Option<u64>,
    #[serde(default)]
    pub warmup_secs: u64,
    #[serde(default)]
    pub wait: WaitRange,
    pub tasks: Vec<TaskConfig>,
    /// Optional RNG seed for reproducible tests.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Dump the full request log to results/ as JSONL after the run.
    #[serde(default)]
    pub log_requests: bool,
}

/// One weighted task entry: a single GET endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub path: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

fn default_spawn_rate() -> f64 {
    1.0
}

fn default_timeout_secs() -> u64 {
    30
}

/// Randomized pause between consecutive requests of one user, in seconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WaitRange {
    #[serde(default)]
    pub min_secs: f64,
    #[serde(default)]
    pub max_secs: f64,
}

impl WaitRange {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_secs.is_finite()
            || !self.max_secs.is_finite()
            || self.min_secs < 0.0
            || self.max_secs < 0.0
        {
            return Err(ConfigError::InvalidWaitRange(format!(
                "bounds must be finite and non-negative, got [{}, {}]",
                self.min_secs, self.max_secs
            )));
        }
        if self.min_secs > self.max_secs {
            return Err(ConfigError::InvalidWaitRange(format!(
                "min {} exceeds max {}",
                self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

impl TestConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TestConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration. Runs before the pool starts so that user
    /// loops never hit a configuration problem mid-flight.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users == 0 {
            return Err(ConfigError::ZeroUsers);
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(ConfigError::InvalidSpawnRate);
        }
        if self.duration_secs.is_none() && self.max_requests.is_none() {
            return Err(ConfigError::NoStopCondition);
        }
        if self.duration_secs == Some(0) {
            return Err(ConfigError::ZeroDuration);
        }
        if self.max_requests == Some(0) {
            return Err(ConfigError::ZeroMaxRequests);
        }
        self.wait.validate()?;
        if self.tasks.is_empty() {
            return Err(ConfigError::EmptyTaskSet);
        }
        for task in &self.tasks {
            if task.weight == 0 {
                return Err(ConfigError::ZeroWeight(task.name.clone()));
            }
            if !task.path.starts_with('/') {
                return Err(ConfigError::InvalidTaskPath {
                    name: task.name.clone(),
                    path: task.path.clone(),
                });
            }
        }
        reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Fully-qualified task definitions for the scheduler.
    pub fn task_definitions(&self) -> Vec<TaskDefinition> {
        let base = self.base_url.trim_end_matches('/');
        self.tasks
            .iter()
            .map(|task| TaskDefinition {
                name: task.name.clone(),
                url: format!("{}{}", base, task.path),
                weight: task.weight,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> TestConfig {
        TestConfig {
            name: "test".to_string(),
            description: String::new(),
            base_url: "http://127.0.0.1:8000".to_string(),
            users: 5,
            spawn_rate: 1.0,
            duration_secs: Some(10),
            max_requests: None,
            warmup_secs: 0,
            wait: WaitRange::default(),
            tasks: vec![TaskConfig {
                name: "get_user".to_string(),
                path: "/v0/user/1".to_string(),
                weight: 1,
            }],
            seed: None,
            request_timeout_secs: 30,
            log_requests: false,
        }
    }

    #[test]
    fn test_parse_minimal_yaml_applies_defaults() {
        let yaml = r#"
name: smoke
base_url: http://localhost:8000
users: 3
duration_secs: 5
tasks:
  - name: root
    path: /
"#;
        let config: TestConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tasks[0].weight, 1);
        assert_eq!(config.spawn_rate, 1.0);
        assert_eq!(config.warmup_secs, 0);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.wait.min_secs, 0.0);
        assert_eq!(config.wait.max_secs, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_base_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_empty_task_set_rejected() {
        let mut config = base_config();
        config.tasks.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyTaskSet)
        ));
    }

    #[test]
    fn test_zero_users_rejected() {
        let mut config = base_config();
        config.users = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroUsers)));
    }

    #[test]
    fn test_missing_stop_condition_rejected() {
        let mut config = base_config();
        config.duration_secs = None;
        config.max_requests = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoStopCondition)
        ));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut config = base_config();
        config.duration_secs = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration)));
    }

    #[test]
    fn test_inverted_wait_range_rejected() {
        let mut config = base_config();
        config.wait = WaitRange {
            min_secs: 2.0,
            max_secs: 1.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWaitRange(_))
        ));
    }

    #[test]
    fn test_negative_wait_range_rejected() {
        let mut config = base_config();
        config.wait = WaitRange {
            min_secs: -1.0,
            max_secs: 1.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWaitRange(_))
        ));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config = base_config();
        config.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let mut config = base_config();
        config.tasks[0].weight = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWeight(_))));
    }

    #[test]
    fn test_relative_task_path_rejected() {
        let mut config = base_config();
        config.tasks[0].path = "v0/user/1".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTaskPath { .. })
        ));
    }

    #[test]
    fn test_task_definitions_join_base_and_path() {
        let mut config = base_config();
        config.base_url = "http://localhost:8000/".to_string();
        let defs = config.task_definitions();
        assert_eq!(defs[0].url, "http://localhost:8000/v0/user/1");
    }
}

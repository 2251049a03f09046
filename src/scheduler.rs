//! Weighted task selection and inter-request delays.

use crate::config::WaitRange;
use crate::error::ConfigError;
use rand::Rng;
use std::time::Duration;

/// One selectable action: a single GET against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub name: String,
    pub url: String,
    pub weight: u32,
}

/// Selects the next task for a user and the pause that follows it.
///
/// Weights are folded into a cumulative table once at construction; each
/// `next` call maps a uniform draw to an index via binary search, so the
/// steady-state path neither allocates nor fails.
#[derive(Debug)]
pub struct TaskScheduler {
    tasks: Vec<TaskDefinition>,
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl TaskScheduler {
    /// Build a scheduler over the task set.
    ///
    /// An empty set or a zero weight is rejected here, at pool-start time.
    pub fn new(tasks: Vec<TaskDefinition>) -> Result<Self, ConfigError> {
        if tasks.is_empty() {
            return Err(ConfigError::EmptyTaskSet);
        }
        let mut cumulative = Vec::with_capacity(tasks.len());
        let mut total: u64 = 0;
        for task in &tasks {
            if task.weight == 0 {
                return Err(ConfigError::ZeroWeight(task.name.clone()));
            }
            total = total
                .checked_add(u64::from(task.weight))
                .ok_or(ConfigError::WeightOverflow)?;
            cumulative.push(total);
        }
        Ok(Self {
            tasks,
            cumulative,
            total_weight: total,
        })
    }

    /// Pick the next task by weighted random sampling. Selection probability
    /// of a task is weight / total weight.
    pub fn next<R: Rng>(&self, rng: &mut R) -> &TaskDefinition {
        let draw = rng.gen_range(0..self.total_weight);
        let idx = self.cumulative.partition_point(|&bound| bound <= draw);
        &self.tasks[idx]
    }

    /// Draw the pause before a user's next request, uniform over
    /// [min_secs, max_secs] inclusive.
    pub fn next_delay<R: Rng>(&self, wait: &WaitRange, rng: &mut R) -> Duration {
        if wait.max_secs <= wait.min_secs {
            return Duration::from_secs_f64(wait.min_secs);
        }
        Duration::from_secs_f64(rng.gen_range(wait.min_secs..=wait.max_secs))
    }

    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn task(name: &str, weight: u32) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            url: format!("http://127.0.0.1:8000/{name}"),
            weight,
        }
    }

    #[test]
    fn test_empty_task_set_rejected() {
        assert!(matches!(
            TaskScheduler::new(Vec::new()),
            Err(ConfigError::EmptyTaskSet)
        ));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let err = TaskScheduler::new(vec![task("a", 1), task("b", 0)]).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWeight(name) if name == "b"));
    }

    #[test]
    fn test_single_task_always_selected() {
        let scheduler = TaskScheduler::new(vec![task("only", 1)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(scheduler.next(&mut rng).name, "only");
        }
    }

    #[test]
    fn test_selection_frequency_tracks_weights() {
        let scheduler =
            TaskScheduler::new(vec![task("a", 1), task("b", 2), task("c", 7)]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u64; 3];
        let draws = 100_000u64;
        for _ in 0..draws {
            match scheduler.next(&mut rng).name.as_str() {
                "a" => counts[0] += 1,
                "b" => counts[1] += 1,
                "c" => counts[2] += 1,
                other => panic!("unexpected task {other}"),
            }
        }
        let expected = [0.1, 0.2, 0.7];
        for (count, expected) in counts.iter().zip(expected) {
            let freq = *count as f64 / draws as f64;
            assert!(
                (freq - expected).abs() < 0.01,
                "observed frequency {freq} too far from {expected}"
            );
        }
    }

    #[test]
    fn test_delay_stays_within_range() {
        let scheduler = TaskScheduler::new(vec![task("a", 1)]).unwrap();
        let wait = WaitRange {
            min_secs: 0.01,
            max_secs: 0.05,
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let delay = scheduler.next_delay(&wait, &mut rng).as_secs_f64();
            assert!(delay >= 0.01 - 1e-9 && delay <= 0.05 + 1e-9, "delay {delay}");
        }
    }

    #[test]
    fn test_zero_range_yields_zero_delay() {
        let scheduler = TaskScheduler::new(vec![task("a", 1)]).unwrap();
        let wait = WaitRange {
            min_secs: 0.0,
            max_secs: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        assert!(scheduler.next_delay(&wait, &mut rng).is_zero());
    }

    #[test]
    fn test_degenerate_range_returns_min() {
        let scheduler = TaskScheduler::new(vec![task("a", 1)]).unwrap();
        let wait = WaitRange {
            min_secs: 2.0,
            max_secs: 2.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            scheduler.next_delay(&wait, &mut rng),
            Duration::from_secs(2)
        );
    }
}

//! Virtual user pool: spawning, the per-user loop, and cooperative stop.

use crate::client::{FetchOutcome, HttpClient};
use crate::config::WaitRange;
use crate::error::ConfigError;
use crate::metrics::{MetricsCollector, Outcome, RequestResult};
use crate::scheduler::{TaskDefinition, TaskScheduler};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// When a run ends: a wall-clock deadline, a total request budget, or both.
#[derive(Debug, Clone, Copy)]
pub struct StopPlan {
    pub duration: Option<Duration>,
    pub max_requests: Option<u64>,
}

/// Options for starting a pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub users: u32,
    /// Users started per second during ramp-up.
    pub spawn_rate: f64,
    pub wait: WaitRange,
    pub stop: StopPlan,
    pub seed: Option<u64>,
}

/// Shared request allowance for budget-bounded runs. A slot is claimed
/// *before* the request starts, so a bounded run issues exactly N requests.
struct RequestBudget {
    remaining: AtomicU64,
}

impl RequestBudget {
    fn new(n: u64) -> Self {
        Self {
            remaining: AtomicU64::new(n),
        }
    }

    fn try_claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Cloneable stop signal, for external cancellation (Ctrl-C etc).
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A running set of virtual users.
///
/// Each user is an independent tokio task looping pick task -> execute ->
/// record -> wait. Users cooperate only through the shared metrics log and
/// the shared stop flag / request budget.
pub struct VirtualUserPool {
    stop_flag: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl VirtualUserPool {
    /// Spawn `users` independent user loops.
    ///
    /// Configuration problems surface here, before any user task exists.
    pub fn start(
        options: PoolOptions,
        scheduler: Arc<TaskScheduler>,
        client: Arc<dyn HttpClient>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        if options.users == 0 {
            return Err(ConfigError::ZeroUsers);
        }
        if !options.spawn_rate.is_finite() || options.spawn_rate <= 0.0 {
            return Err(ConfigError::InvalidSpawnRate);
        }
        options.wait.validate()?;
        if options.stop.duration.is_none() && options.stop.max_requests.is_none() {
            return Err(ConfigError::NoStopCondition);
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let budget = options
            .stop
            .max_requests
            .map(|n| Arc::new(RequestBudget::new(n)));
        let deadline = options.stop.duration.map(|d| Instant::now() + d);

        let mut handles = Vec::with_capacity(options.users as usize);
        for id in 0..options.users {
            let start_delay = Duration::from_secs_f64(f64::from(id) / options.spawn_rate);
            // Independent stream per user; a fixed seed still gives each
            // user id a reproducible schedule.
            let rng = match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(id))),
                None => StdRng::from_entropy(),
            };
            handles.push(tokio::spawn(user_loop(UserContext {
                id,
                start_delay,
                wait: options.wait,
                rng,
                scheduler: scheduler.clone(),
                client: client.clone(),
                metrics: metrics.clone(),
                stop_flag: stop_flag.clone(),
                budget: budget.clone(),
                deadline,
            })));
        }

        Ok(Self { stop_flag, handles })
    }

    /// Signal every user to stop after its current request/sleep completes.
    /// Never interrupts a request mid-flight.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop_flag.clone(),
        }
    }

    /// True once every user loop has returned.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|handle| handle.is_finished())
    }

    /// Wait for every user loop to finish. Nothing is aborted.
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            // A user loop only ends by returning; a join error means it
            // panicked, which we surface rather than swallow.
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "virtual user task failed");
            }
        }
    }
}

struct UserContext {
    id: u32,
    start_delay: Duration,
    wait: WaitRange,
    rng: StdRng,
    scheduler: Arc<TaskScheduler>,
    client: Arc<dyn HttpClient>,
    metrics: Arc<MetricsCollector>,
    stop_flag: Arc<AtomicBool>,
    budget: Option<Arc<RequestBudget>>,
    deadline: Option<Instant>,
}

async fn user_loop(mut ctx: UserContext) {
    if !ctx.start_delay.is_zero() {
        sleep_capped(ctx.start_delay, ctx.deadline).await;
    }
    // Stopped before this user ever ramped up.
    if ctx.stop_flag.load(Ordering::Relaxed) || past_deadline(ctx.deadline) {
        return;
    }

    ctx.metrics.user_started(ctx.id);
    loop {
        if ctx.stop_flag.load(Ordering::Relaxed) || past_deadline(ctx.deadline) {
            break;
        }
        if let Some(budget) = &ctx.budget {
            if !budget.try_claim() {
                break;
            }
        }

        let task = ctx.scheduler.next(&mut ctx.rng);
        let offset_ms = ctx.metrics.offset_ms();
        let fetch = ctx.client.get(&task.url).await;
        ctx.metrics.record(to_result(task, offset_ms, fetch));

        let delay = ctx.scheduler.next_delay(&ctx.wait, &mut ctx.rng);
        if delay.is_zero() {
            // Keep zero-wait loops cooperative.
            tokio::task::yield_now().await;
        } else {
            sleep_capped(delay, ctx.deadline).await;
        }
    }
    ctx.metrics.user_stopped(ctx.id);
}

fn to_result(task: &TaskDefinition, offset_ms: u64, fetch: FetchOutcome) -> RequestResult {
    let outcome = match fetch.error {
        Some(reason) => Outcome::Failure { reason },
        None if (200..300).contains(&fetch.status) => Outcome::Success {
            status: fetch.status,
        },
        None => Outcome::Failure {
            reason: format!("HTTP {}", fetch.status),
        },
    };
    if let Outcome::Failure { reason } = &outcome {
        tracing::debug!(task = %task.name, %reason, "request failed");
    }
    RequestResult {
        offset_ms,
        task: task.name.clone(),
        endpoint: task.url.clone(),
        duration_us: fetch.duration.as_micros() as u64,
        outcome,
    }
}

fn past_deadline(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Sleep for `delay`, but never past the run deadline.
async fn sleep_capped(delay: Duration, deadline: Option<Instant>) {
    let mut target = Instant::now() + delay;
    if let Some(deadline) = deadline {
        target = target.min(deadline);
    }
    tokio::time::sleep_until(target).await;
}

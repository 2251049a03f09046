//! Load test orchestration: wires config, scheduler, pool, and metrics.

use crate::client::{HttpClient, ReqwestClient};
use crate::config::TestConfig;
use crate::metrics::{MetricsCollector, TestResults};
use crate::pool::{PoolOptions, StopPlan, VirtualUserPool};
use crate::scheduler::TaskScheduler;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes a load test described by a `TestConfig`.
pub struct LoadRunner {
    config: TestConfig,
}

impl LoadRunner {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    /// Run the test to completion (or Ctrl-C) and return the results.
    pub async fn run(&self) -> anyhow::Result<TestResults> {
        let client = ReqwestClient::new(
            Duration::from_secs(self.config.request_timeout_secs),
            self.config.users as usize,
        )?;
        self.run_with_client(Arc::new(client)).await
    }

    /// Same as `run`, with the HTTP collaborator supplied by the caller.
    pub async fn run_with_client(
        &self,
        client: Arc<dyn HttpClient>,
    ) -> anyhow::Result<TestResults> {
        self.config.validate()?;
        let scheduler = Arc::new(TaskScheduler::new(self.config.task_definitions())?);
        let metrics = Arc::new(MetricsCollector::new());

        tracing::info!(
            name = %self.config.name,
            users = self.config.users,
            spawn_rate = self.config.spawn_rate,
            "starting load test"
        );

        // Warmup extends the wall clock; the metrics log is cleared at the
        // warmup boundary so only the test phase is reported.
        let warmup = Duration::from_secs(self.config.warmup_secs);
        let total_duration = self
            .config
            .duration_secs
            .map(|d| Duration::from_secs(d + self.config.warmup_secs));

        let mut pool = VirtualUserPool::start(
            PoolOptions {
                users: self.config.users,
                spawn_rate: self.config.spawn_rate,
                wait: self.config.wait,
                stop: StopPlan {
                    duration: total_duration,
                    max_requests: self.config.max_requests,
                },
                seed: self.config.seed,
            },
            scheduler,
            client,
            metrics.clone(),
        )?;

        // Ctrl-C requests a graceful stop: in-flight requests complete and
        // the summary still prints.
        let stop_handle = pool.stop_handle();
        let interrupt_watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after in-flight requests");
                stop_handle.stop();
            }
        });

        let progress = self.progress_bar();
        let started = Instant::now();
        let mut measure_start = started;
        let mut warmed_up = self.config.warmup_secs == 0;

        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;

            if !warmed_up && started.elapsed() >= warmup {
                warmed_up = true;
                metrics.reset();
                measure_start = Instant::now();
                progress.set_message("measuring");
            }

            if warmed_up {
                match self.config.duration_secs {
                    Some(_) => progress.set_position(started.elapsed().as_secs()),
                    None => progress.set_position(metrics.len() as u64),
                }
            } else {
                progress.set_message(format!(
                    "warmup ({}/{}s)",
                    started.elapsed().as_secs(),
                    self.config.warmup_secs
                ));
            }

            if pool.is_finished() {
                break;
            }
        }

        pool.join().await;
        interrupt_watcher.abort();
        progress.finish_with_message("complete");

        let elapsed = measure_start.elapsed();
        let results = metrics.results(self.config.name.clone(), self.config.users, elapsed)?;

        tracing::info!(
            requests = results.total_requests,
            failed = results.failed_requests,
            rps = format!("{:.1}", results.requests_per_second),
            "load test finished"
        );

        if self.config.log_requests {
            let path = self.write_request_log(&metrics)?;
            tracing::info!(path = %path.display(), "request log written");
        }

        Ok(results)
    }

    fn progress_bar(&self) -> ProgressBar {
        let (len, template) = match self.config.duration_secs {
            Some(duration) => (
                duration + self.config.warmup_secs,
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}",
            ),
            None => (
                self.config.max_requests.unwrap_or(0),
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} reqs {msg}",
            ),
        };
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(template)
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        bar
    }

    /// Dump the retained request log as JSONL, one record per line.
    fn write_request_log(&self, metrics: &MetricsCollector) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all("results")?;
        let name = self.config.name.replace(' ', "_").to_lowercase();
        let path = PathBuf::from(format!(
            "results/{}_{}.jsonl",
            name,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        for entry in metrics.log_snapshot()? {
            serde_json::to_writer(&mut writer, &entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(path)
    }
}

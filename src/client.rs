//! HTTP execution: the collaborator every virtual user calls once per request.

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Raw outcome of one GET, as reported by the transport.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// HTTP status, or 0 when the request never produced a response.
    pub status: u16,
    pub duration: Duration,
    pub bytes: u64,
    /// Transport-level error text (connect failure, timeout, ...).
    pub error: Option<String>,
}

/// Object-safe GET interface, so the pool can be driven without a network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> FetchOutcome;
}

/// reqwest-backed client used by the CLI.
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, pool_size: usize) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .build()?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> FetchOutcome {
        let start = Instant::now();
        match self.inner.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so latency covers the full transfer.
                let bytes = match response.bytes().await {
                    Ok(body) => body.len() as u64,
                    Err(_) => 0,
                };
                FetchOutcome {
                    status,
                    duration: start.elapsed(),
                    bytes,
                    error: None,
                }
            }
            Err(e) => FetchOutcome {
                status: 0,
                duration: start.elapsed(),
                bytes: 0,
                error: Some(e.to_string()),
            },
        }
    }
}

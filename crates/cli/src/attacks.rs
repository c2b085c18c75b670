// Built-in attacks
//
// Both read their parameters from the run metadata (`--meta key=value`).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Method;
use stampede_core::{Attack, AttackFactory, CallResult, RunConfig};
use tracing::debug;

/// Attacks shipped with the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AttackKind {
    /// HTTP requests against `--meta url=...`
    Http,
    /// Simulated calls with configurable latency and error ratio
    Sleep,
}

impl AttackKind {
    pub fn factory(self) -> Arc<dyn AttackFactory> {
        match self {
            AttackKind::Http => Arc::new(|| Box::new(HttpAttack::default()) as Box<dyn Attack>),
            AttackKind::Sleep => Arc::new(|| Box::new(SleepAttack::default()) as Box<dyn Attack>),
        }
    }
}

/// Parse metadata `key`, falling back to `default` when absent
fn meta_or<T>(config: &RunConfig, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match config.metadata(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid metadata {}={}", key, raw)),
        None => Ok(default),
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Sends one request per call
///
/// Metadata:
/// - `url` (required)
/// - `method`: GET (default), POST, PUT, ...
/// - `body`: request body, sent as-is
/// - `label`: metrics label (default: lowercased method)
#[derive(Default)]
pub struct HttpAttack {
    client: Option<reqwest::Client>,
    url: String,
    method: Method,
    body: Option<String>,
    label: String,
}

#[async_trait]
impl Attack for HttpAttack {
    async fn setup(&mut self, config: &RunConfig) -> anyhow::Result<()> {
        let url = config
            .metadata("url")
            .context("http attack needs --meta url=...")?;
        reqwest::Url::parse(url).with_context(|| format!("invalid url '{}'", url))?;

        let method = config.metadata("method").unwrap_or("GET");
        self.method = Method::from_bytes(method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid method '{}'", method))?;
        self.url = url.to_string();
        self.body = config.metadata("body").map(str::to_string);
        self.label = config
            .metadata("label")
            .map(str::to_string)
            .unwrap_or_else(|| self.method.as_str().to_lowercase());

        let client = reqwest::Client::builder()
            .user_agent(concat!("stampede/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        self.client = Some(client);
        debug!(url = %self.url, method = %self.method, "HTTP attack ready");
        Ok(())
    }

    async fn call(&mut self) -> CallResult {
        let Some(client) = &self.client else {
            return CallResult::failure(&self.label, "attack not set up");
        };

        let mut request = client.request(self.method.clone(), &self.url);
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                // drain the body so the connection can be reused
                let _ = response.bytes().await;
                let result = if status.is_client_error() || status.is_server_error() {
                    CallResult::failure(&self.label, format!("HTTP {}", status.as_u16()))
                } else {
                    CallResult::success(&self.label)
                };
                result.with_status(status.as_u16())
            }
            Err(e) => {
                let result = CallResult::failure(&self.label, e.to_string());
                match e.status() {
                    Some(status) => result.with_status(status.as_u16()),
                    None => result,
                }
            }
        }
    }

    async fn teardown(&mut self) -> anyhow::Result<()> {
        self.client = None;
        Ok(())
    }
}

// ============================================================================
// Sleep
// ============================================================================

/// Waits a jittered latency and sometimes fails
///
/// Metadata:
/// - `latency_ms`: base latency (default 50)
/// - `jitter_ms`: uniform jitter added on top (default 10)
/// - `error_ratio`: probability of a failed call, 0.0..=1.0 (default 0)
/// - `seed`: RNG seed for repeatable runs
pub struct SleepAttack {
    latency: Duration,
    jitter_ms: u64,
    error_ratio: f64,
    rng: StdRng,
}

impl Default for SleepAttack {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(50),
            jitter_ms: 10,
            error_ratio: 0.0,
            rng: StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl Attack for SleepAttack {
    async fn setup(&mut self, config: &RunConfig) -> anyhow::Result<()> {
        self.latency = Duration::from_millis(meta_or(config, "latency_ms", 50u64)?);
        self.jitter_ms = meta_or(config, "jitter_ms", 10u64)?;
        self.error_ratio = meta_or(config, "error_ratio", 0.0f64)?;
        if !(0.0..=1.0).contains(&self.error_ratio) {
            bail!("error_ratio must be within 0.0..=1.0, got {}", self.error_ratio);
        }
        if let Some(seed) = config.metadata("seed") {
            let seed: u64 = seed
                .parse()
                .with_context(|| format!("invalid metadata seed={}", seed))?;
            self.rng = StdRng::seed_from_u64(seed);
        }
        Ok(())
    }

    async fn call(&mut self) -> CallResult {
        let jitter = if self.jitter_ms > 0 {
            self.rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        let fail = self.rng.gen_bool(self.error_ratio);

        tokio::time::sleep(self.latency + Duration::from_millis(jitter)).await;

        if fail {
            CallResult::failure("sleep", "simulated failure")
        } else {
            CallResult::success("sleep")
        }
    }

    async fn teardown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

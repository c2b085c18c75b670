//! Per-label call statistics
//!
//! A [`Metrics`] record only accumulates raw data in [`Metrics::add`];
//! everything derived (rate, percentiles) is computed once in
//! [`Metrics::finalize`]. Every accumulated quantity is a sum, a count, a
//! min or a max, so the result does not depend on the order outcomes arrive.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::attack::CallOutcome;

/// Distinct error messages kept per label (the smallest ones)
const MAX_ERROR_MESSAGES: usize = 32;

/// Label to metrics mapping, ordered for stable reports
pub type MetricsMap = BTreeMap<String, Metrics>;

/// Summary statistics for latency
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    #[serde(rename = "total_ms", serialize_with = "as_millis")]
    pub total: Duration,
    #[serde(rename = "mean_ms", serialize_with = "as_millis")]
    pub mean: Duration,
    #[serde(rename = "min_ms", serialize_with = "as_millis")]
    pub min: Duration,
    #[serde(rename = "max_ms", serialize_with = "as_millis")]
    pub max: Duration,
    #[serde(rename = "p50_ms", serialize_with = "as_millis")]
    pub p50: Duration,
    #[serde(rename = "p95_ms", serialize_with = "as_millis")]
    pub p95: Duration,
    #[serde(rename = "p99_ms", serialize_with = "as_millis")]
    pub p99: Duration,
}

impl LatencySummary {
    /// Compute the summary, sorting `samples` in place
    pub fn from_samples(samples: &mut [Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_unstable();
        let total: Duration = samples.iter().sum();
        let count = samples.len() as u32;

        Self {
            total,
            mean: total / count,
            min: samples[0],
            max: samples[samples.len() - 1],
            p50: percentile(samples, 0.50),
            p95: percentile(samples, 0.95),
            p99: percentile(samples, 0.99),
        }
    }
}

/// Percentile (0.0 to 1.0) of already sorted samples
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn as_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Running aggregate for one label
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    /// Calls observed
    pub requests: u64,
    /// Calls without an error
    pub successes: u64,
    /// Calls carrying an error (timeouts included)
    pub errors: u64,
    /// Calls per second over the observed window (derived)
    pub rate: f64,
    /// successes / requests (derived)
    pub success_ratio: f64,
    /// Derived from the raw samples on finalize
    pub latencies: LatencySummary,
    /// Count per reported status; calls without status are not counted here
    pub status_codes: BTreeMap<u16, u64>,
    /// Distinct error messages, the lexically smallest ones up to the cap
    pub error_messages: BTreeSet<String>,
    /// Start of the earliest call
    pub earliest: Option<DateTime<Utc>>,
    /// End of the latest call
    pub latest: Option<DateTime<Utc>>,
    #[serde(skip)]
    samples: Vec<Duration>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the record
    pub fn add(&mut self, outcome: &CallOutcome) {
        self.requests += 1;
        match &outcome.result.error {
            Some(message) => {
                self.errors += 1;
                if self.error_messages.insert(message.clone())
                    && self.error_messages.len() > MAX_ERROR_MESSAGES
                {
                    self.error_messages.pop_last();
                }
            }
            None => self.successes += 1,
        }
        if let Some(status) = outcome.result.status {
            *self.status_codes.entry(status).or_insert(0) += 1;
        }

        self.samples.push(outcome.latency);

        let started = outcome.started_at;
        let finished = outcome.finished_at();
        self.earliest = Some(self.earliest.map_or(started, |e| e.min(started)));
        self.latest = Some(self.latest.map_or(finished, |l| l.max(finished)));
    }

    /// Compute rate, success ratio and the latency summary
    pub fn finalize(&mut self) {
        self.latencies = LatencySummary::from_samples(&mut self.samples);

        self.success_ratio = if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64
        };

        let window = self.window().as_secs_f64();
        self.rate = if window > 0.0 {
            self.requests as f64 / window
        } else {
            0.0
        };
    }

    /// Time between the earliest start and the latest end
    pub fn window(&self) -> Duration {
        match (self.earliest, self.latest) {
            (Some(earliest), Some(latest)) => (latest - earliest).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Number of raw latency samples held
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

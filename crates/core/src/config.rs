//! Load profile configuration
//!
//! A [`RunConfig`] is immutable once a run starts. It is handed to every
//! attack instance at setup and snapshotted into the final report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};
use crate::rampup::RampUpStrategy;

/// Load profile for a run
///
/// # Example
///
/// ```
/// use stampede_core::{RampUpStrategy, RunConfig};
/// use std::time::Duration;
///
/// let config = RunConfig::new(200, Duration::from_secs(60))
///     .with_ramp_up(Duration::from_secs(10))
///     .with_max_attackers(50)
///     .with_strategy(RampUpStrategy::SpawnAsNeeded)
///     .with_metadata("url", "http://localhost:8080/health");
///
/// assert!(config.validate().is_empty());
/// assert_eq!(config.steady_state(), Duration::from_secs(50));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Target rate in calls per second
    pub rate: u32,

    /// Total attack duration, ramp-up included
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// Ramp-up window, stepped in whole seconds
    #[serde(with = "duration_millis")]
    pub ramp_up: Duration,

    /// Upper bound on the attacker pool
    pub max_attackers: usize,

    /// How the pool grows during ramp-up
    pub ramp_up_strategy: RampUpStrategy,

    /// Per-call timeout (None = calls may take as long as they like)
    #[serde(with = "option_duration_millis")]
    pub call_timeout: Option<Duration>,

    /// Verbose lifecycle logging
    pub verbose: bool,

    /// Report destination (None = stdout)
    pub output: Option<PathBuf>,

    /// Free-form parameters for attack implementations
    pub metadata: BTreeMap<String, String>,

    /// How long the quit fan-out waits for each unit to return to Waiting
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rate: 1,
            duration: Duration::from_secs(60),
            ramp_up: Duration::from_secs(10),
            max_attackers: 10,
            ramp_up_strategy: RampUpStrategy::Linear,
            call_timeout: Some(Duration::from_secs(5)),
            verbose: false,
            output: None,
            metadata: BTreeMap::new(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    /// Create a configuration for `rate` calls/second over `duration`, no ramp-up
    pub fn new(rate: u32, duration: Duration) -> Self {
        Self {
            rate,
            duration,
            ramp_up: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file; absent fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RunnerError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| RunnerError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Set the target rate
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    /// Set the total duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the ramp-up window
    pub fn with_ramp_up(mut self, ramp_up: Duration) -> Self {
        self.ramp_up = ramp_up;
        self
    }

    /// Set the maximum pool size
    pub fn with_max_attackers(mut self, max: usize) -> Self {
        self.max_attackers = max;
        self
    }

    /// Set the ramp-up strategy
    pub fn with_strategy(mut self, strategy: RampUpStrategy) -> Self {
        self.ramp_up_strategy = strategy;
        self
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Remove the per-call timeout
    pub fn without_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    /// Enable or disable verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the report destination
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the quit fan-out timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Look up a metadata value
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Duration of the full-rate phase after ramp-up
    pub fn steady_state(&self) -> Duration {
        self.duration.saturating_sub(self.ramp_up)
    }

    /// Number of one-second ramp-up steps
    pub fn ramp_up_steps(&self) -> u32 {
        u32::try_from(self.ramp_up.as_secs()).unwrap_or(u32::MAX)
    }

    /// Check the profile, returning one human-readable line per problem
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.rate == 0 {
            problems.push("rate must be > 0".to_string());
        }
        if self.duration.is_zero() {
            problems.push("duration must be > 0".to_string());
        }
        if self.ramp_up > self.duration {
            problems.push(format!(
                "ramp-up ({:?}) must be <= duration ({:?})",
                self.ramp_up, self.duration
            ));
        }
        if self.ramp_up.subsec_nanos() != 0 {
            problems.push(format!(
                "ramp-up ({:?}) must be a whole number of seconds",
                self.ramp_up
            ));
        }
        if self.max_attackers == 0 {
            problems.push("max attackers must be >= 1".to_string());
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            problems.push("call timeout must be > 0 when set".to_string());
        }
        if self.shutdown_timeout.is_zero() {
            problems.push("shutdown timeout must be > 0".to_string());
        }

        problems
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

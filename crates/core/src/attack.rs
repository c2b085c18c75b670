//! Attack contract
//!
//! An [`Attack`] performs one call against a target service. The runner
//! never constructs attacks itself: it asks an [`AttackFactory`] for a fresh
//! instance whenever the pool grows, so instances share no mutable state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Label under which timed-out calls are aggregated
pub const TIMEOUT_LABEL: &str = "timeout";

/// One concurrent caller
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use stampede_core::{Attack, CallResult, RunConfig};
///
/// struct Ping;
///
/// #[async_trait]
/// impl Attack for Ping {
///     async fn setup(&mut self, _config: &RunConfig) -> anyhow::Result<()> {
///         Ok(())
///     }
///
///     async fn call(&mut self) -> CallResult {
///         CallResult::success("ping").with_status(200)
///     }
///
///     async fn teardown(&mut self) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Attack: Send {
    /// Prepare the instance (open connections, read metadata, ...)
    async fn setup(&mut self, config: &RunConfig) -> anyhow::Result<()>;

    /// Perform one call; failures are reported in the result, not raised
    async fn call(&mut self) -> CallResult;

    /// Release whatever setup acquired
    async fn teardown(&mut self) -> anyhow::Result<()>;
}

/// Produces independent attack instances
pub trait AttackFactory: Send + Sync {
    /// Create a new, not yet set up, instance
    fn create(&self) -> Box<dyn Attack>;
}

impl<F> AttackFactory for F
where
    F: Fn() -> Box<dyn Attack> + Send + Sync,
{
    fn create(&self) -> Box<dyn Attack> {
        self()
    }
}

/// What an attack reports about one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// Logical request type; metrics are aggregated per label
    pub label: String,
    /// Protocol status, if the target has one
    pub status: Option<u16>,
    /// Error description when the call failed
    pub error: Option<String>,
}

impl CallResult {
    /// A successful call
    pub fn success(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: None,
            error: None,
        }
    }

    /// A failed call
    pub fn failure(label: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: None,
            error: Some(error.into()),
        }
    }

    /// A call abandoned after `limit`
    pub fn timed_out(limit: Duration) -> Self {
        Self::failure(TIMEOUT_LABEL, format!("call timed out after {:?}", limit))
    }

    /// Attach a status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether the call failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Where an outcome is aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationTarget {
    /// The run's per-label metrics
    Cumulative,
    /// The transient record of one ramp-up step
    Step(u32),
}

/// A call result with the timing measured by the execution unit
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub result: CallResult,
    /// Wall-clock time the call began
    pub started_at: DateTime<Utc>,
    pub latency: Duration,
    /// Copied from the dispatch signal that triggered the call
    pub target: AggregationTarget,
}

impl CallOutcome {
    pub fn new(
        result: CallResult,
        started_at: DateTime<Utc>,
        latency: Duration,
        target: AggregationTarget,
    ) -> Self {
        Self {
            result,
            started_at,
            latency,
            target,
        }
    }

    pub fn label(&self) -> &str {
        &self.result.label
    }

    pub fn is_error(&self) -> bool {
        self.result.is_error()
    }

    /// Wall-clock time the call finished
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.started_at
            + chrono::Duration::from_std(self.latency).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Attack for Noop {
        async fn setup(&mut self, _config: &RunConfig) -> anyhow::Result<()> {
            Ok(())
        }

        async fn call(&mut self) -> CallResult {
            CallResult::success("noop")
        }

        async fn teardown(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_closure_is_a_factory() {
        let factory = || Box::new(Noop) as Box<dyn Attack>;
        let mut attack = AttackFactory::create(&factory);

        attack.setup(&RunConfig::default()).await.unwrap();
        assert_eq!(attack.call().await, CallResult::success("noop"));
        attack.teardown().await.unwrap();
    }

    #[test]
    fn test_timed_out_result() {
        let result = CallResult::timed_out(Duration::from_millis(50));
        assert_eq!(result.label, TIMEOUT_LABEL);
        assert!(result.is_error());
        assert!(result.error.unwrap().contains("50ms"));
    }

    #[test]
    fn test_outcome_finished_at() {
        let started_at = Utc::now();
        let outcome = CallOutcome::new(
            CallResult::success("a").with_status(204),
            started_at,
            Duration::from_millis(1500),
            AggregationTarget::Cumulative,
        );

        assert_eq!(outcome.label(), "a");
        assert!(!outcome.is_error());
        assert_eq!(
            outcome.finished_at() - started_at,
            chrono::Duration::milliseconds(1500)
        );
    }
}

//! Ramp-up strategies
//!
//! The ramp-up window is split into one-second steps. Step `i` of `N` runs
//! the dispatcher at `max(1, i·R/N)` calls/second into a transient record,
//! then looks at the achieved rate. When it falls under 90% of the step
//! target, the pool is grown before the next step:
//!
//! - [`RampUpStrategy::Linear`]: `floor(target / achieved) × pool size`
//! - [`RampUpStrategy::SpawnAsNeeded`]: `2 × pool size`
//!
//! Both are clamped to the configured maximum. This is a once-per-second
//! multiplicative estimate, not a closed-loop controller.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::attack::AggregationTarget;
use crate::dispatch::Dispatcher;
use crate::pool::AttackerPool;

/// Achieved/target ratio under which the pool is grown
pub const SPAWN_THRESHOLD_RATIO: f64 = 0.9;

const STEP: Duration = Duration::from_secs(1);

/// How the attacker pool grows during ramp-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RampUpStrategy {
    /// Multiply the pool by the observed shortfall
    #[default]
    Linear,
    /// Double the pool whenever the step falls short
    #[serde(alias = "exp2")]
    SpawnAsNeeded,
}

impl RampUpStrategy {
    /// Pool size the strategy wants after a step, never above `max`
    ///
    /// Returns `current` when no growth is needed: the step produced no
    /// measurable rate, or reached at least 90% of `target`.
    pub fn desired_pool_size(&self, target: u32, achieved: f64, current: usize, max: usize) -> usize {
        if achieved <= 0.0 || target == 0 {
            return current;
        }
        if achieved / target as f64 >= SPAWN_THRESHOLD_RATIO {
            return current;
        }

        let wanted = match self {
            RampUpStrategy::Linear => {
                let factor = (target as f64 / achieved).floor();
                if factor >= max as f64 {
                    max
                } else {
                    (factor as usize).saturating_mul(current)
                }
            }
            RampUpStrategy::SpawnAsNeeded => current.saturating_mul(2),
        };

        wanted.min(max).max(current.min(max))
    }

    /// Name used in configs and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            RampUpStrategy::Linear => "linear",
            RampUpStrategy::SpawnAsNeeded => "spawn-as-needed",
        }
    }
}

impl fmt::Display for RampUpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RampUpStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(RampUpStrategy::Linear),
            "spawn-as-needed" | "exp2" => Ok(RampUpStrategy::SpawnAsNeeded),
            other => Err(format!(
                "unknown ramp-up strategy '{}', expected 'linear' or 'spawn-as-needed'",
                other
            )),
        }
    }
}

/// Instantaneous target of step `step` (1-indexed) out of `steps`
pub fn step_rate(rate: u32, step: u32, steps: u32) -> u32 {
    if steps == 0 {
        return rate.max(1);
    }
    let scaled = u64::from(step) * u64::from(rate) / u64::from(steps);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// What the ramp-up ended with
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RampUpSummary {
    pub strategy: RampUpStrategy,
    /// Steps executed
    pub steps: u32,
    /// Target of the last step
    pub last_target: u32,
    /// Achieved rate of the last step
    pub last_rate: f64,
    /// Calls counted in the last step
    pub last_requests: u64,
    /// Pool size when ramp-up ended
    pub attackers: usize,
    /// Whether growth stopped at the configured maximum
    pub reached_max: bool,
}

/// Run the ramp-up phase, growing `pool` as the strategy decides
pub async fn execute(
    strategy: RampUpStrategy,
    rate: u32,
    steps: u32,
    pool: &mut AttackerPool,
    dispatcher: &Dispatcher,
    aggregator: &Aggregator,
) -> RampUpSummary {
    info!(%strategy, steps, attackers = pool.size(), "Begin ramp-up");
    let mut summary = RampUpSummary {
        strategy,
        attackers: pool.size(),
        ..Default::default()
    };

    for step in 1..=steps {
        let target = step_rate(rate, step, steps);

        aggregator.open_step(step).await;
        dispatcher
            .run(target, STEP, AggregationTarget::Step(step))
            .await;
        let metrics = aggregator.close_step(step).await;

        summary.steps = step;
        summary.last_target = target;
        summary.last_rate = metrics.rate;
        summary.last_requests = metrics.requests;

        if metrics.rate > 0.0 && metrics.rate < target as f64 {
            debug!(step, rate = metrics.rate, target, "Rate below step target");
        }

        let current = pool.size();
        let desired =
            strategy.desired_pool_size(target, metrics.rate, current, pool.max_size());
        if desired > current {
            let added = pool.grow_to(desired).await;
            debug!(step, added, attackers = pool.size(), "Grew attacker pool");
        }
        if desired > current && pool.is_full() && !summary.reached_max {
            warn!(attackers = pool.size(), "Reached maximum attackers");
            summary.reached_max = true;
        }
    }

    summary.attackers = pool.size();
    info!(
        rate = summary.last_rate,
        requests = summary.last_requests,
        attackers = summary.attackers,
        "End ramp-up"
    );
    summary
}

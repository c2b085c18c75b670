//! Run orchestration
//!
//! A run goes through these phases, in order:
//!
//! ```text
//! validate ─▶ bootstrap (1 attacker) ─▶ ramp-up steps ─▶ steady state
//!                                                              │
//!          report ◀─ aggregator.finish ◀─ teardown ◀─ retire ◀─┘
//! ```
//!
//! Ramp-up is skipped when `ramp_up` is zero. Steady state runs for
//! `duration - ramp_up` at the full rate and is the only phase whose
//! outcomes reach the report.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::attack::{AggregationTarget, AttackFactory, CallOutcome};
use crate::config::RunConfig;
use crate::dispatch::control_channels;
use crate::error::{Result, RunnerError};
use crate::pool::{perform, AttackerPool};
use crate::rampup;
use crate::report::RunReport;

/// Capacity of the outcome channel between units and the aggregator
const OUTCOME_BUFFER: usize = 1024;

/// Drives one attack configuration through a full run or a sample
pub struct Runner {
    factory: Arc<dyn AttackFactory>,
    config: Arc<RunConfig>,
}

impl Runner {
    pub fn new(factory: impl AttackFactory + 'static, config: RunConfig) -> Self {
        Self::with_shared_factory(Arc::new(factory), config)
    }

    /// Create a runner from an already shared factory
    pub fn with_shared_factory(factory: Arc<dyn AttackFactory>, config: RunConfig) -> Self {
        Self {
            factory,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the full run and return its report
    ///
    /// Fails only on an invalid configuration or when the aggregator task
    /// dies. Attacker setup and teardown failures are logged and tolerated,
    /// so a run with no working attacker still completes with empty metrics.
    #[instrument(skip(self), fields(rate = self.config.rate, duration = ?self.config.duration))]
    pub async fn run(&self) -> Result<RunReport> {
        let problems = self.config.validate();
        if !problems.is_empty() {
            return Err(RunnerError::InvalidConfig(problems));
        }

        let run_id = Uuid::now_v7();
        info!(%run_id, max_attackers = self.config.max_attackers, "Starting run");

        let (dispatcher, signals) = control_channels();
        let (outcome_tx, outcome_rx) = mpsc::channel::<CallOutcome>(OUTCOME_BUFFER);
        let aggregator = Aggregator::spawn(outcome_rx);
        let mut pool = AttackerPool::new(
            self.factory.clone(),
            self.config.clone(),
            signals,
            outcome_tx,
        );

        if !pool.spawn().await {
            warn!("Initial attacker failed to set up, continuing with an empty pool");
        }

        let steps = self.config.ramp_up_steps();
        let ramp_up = if steps > 0 {
            Some(
                rampup::execute(
                    self.config.ramp_up_strategy,
                    self.config.rate,
                    steps,
                    &mut pool,
                    &dispatcher,
                    &aggregator,
                )
                .await,
            )
        } else {
            None
        };

        let steady = self.config.steady_state();
        info!(
            seconds = steady.as_secs_f64(),
            attackers = pool.size(),
            "Begin full attack"
        );
        let started_at = Utc::now();
        let dispatched = dispatcher
            .run(self.config.rate, steady, AggregationTarget::Cumulative)
            .await;
        let finished_at = Utc::now();
        info!(dispatched, "End full attack");

        pool.retire(&dispatcher).await;
        let attackers = pool.size();
        let clean = pool.teardown().await;
        if clean < attackers {
            warn!(clean, attackers, "Some attackers failed to tear down");
        }
        drop(dispatcher);

        let metrics = aggregator.finish().await?;
        let report = RunReport {
            run_id,
            started_at,
            finished_at,
            config: self.config.as_ref().clone(),
            attackers,
            ramp_up,
            metrics,
        };
        info!(
            %run_id,
            requests = report.total_requests(),
            errors = report.total_errors(),
            "Run complete"
        );
        Ok(report)
    }

    /// Perform `count` calls on a single instance, outside any run
    ///
    /// Meant for checking an attack before a real run: nothing is paced or
    /// aggregated, and each outcome is logged as it completes.
    #[instrument(skip(self))]
    pub async fn sample(&self, count: usize) -> Result<Vec<CallOutcome>> {
        let mut attack = self.factory.create();
        attack
            .setup(&self.config)
            .await
            .map_err(|e| RunnerError::Setup(format!("{:#}", e)))?;

        let mut outcomes = Vec::with_capacity(count);
        for call in 1..=count {
            let outcome = perform(
                attack.as_mut(),
                self.config.call_timeout,
                AggregationTarget::Cumulative,
            )
            .await;
            info!(
                call,
                label = outcome.label(),
                status = ?outcome.result.status,
                error = ?outcome.result.error,
                latency = ?outcome.latency,
                "Sample call"
            );
            outcomes.push(outcome);
        }

        if let Err(e) = attack.teardown().await {
            warn!(error = %e, "Sample attacker teardown failed");
        }
        Ok(outcomes)
    }
}

//! Attacker pool
//!
//! The pool owns every live attack instance. Each instance runs inside its
//! own execution unit (a tokio task) that cycles through:
//!
//! ```text
//!            dispatch                 outcome sent
//! Waiting ─────────────▶ Calling ─────────────────▶ Waiting
//!    │
//!    │ quit (only consumed while Waiting)
//!    ▼
//! Retired ── instance handed back to the pool for teardown
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::attack::{AggregationTarget, Attack, AttackFactory, CallOutcome, CallResult};
use crate::config::RunConfig;
use crate::dispatch::{Dispatch, Dispatcher, Signals};

struct Unit {
    id: usize,
    handle: JoinHandle<Box<dyn Attack>>,
}

/// Owns the attack instances and their execution units
pub struct AttackerPool {
    factory: Arc<dyn AttackFactory>,
    config: Arc<RunConfig>,
    signals: Signals,
    outcomes: mpsc::Sender<CallOutcome>,
    units: Vec<Unit>,
    attempts: usize,
}

impl AttackerPool {
    /// Create an empty pool; units will listen on `signals` and report to `outcomes`
    pub fn new(
        factory: Arc<dyn AttackFactory>,
        config: Arc<RunConfig>,
        signals: Signals,
        outcomes: mpsc::Sender<CallOutcome>,
    ) -> Self {
        Self {
            factory,
            config,
            signals,
            outcomes,
            units: Vec::new(),
            attempts: 0,
        }
    }

    /// Number of registered units
    pub fn size(&self) -> usize {
        self.units.len()
    }

    /// Configured maximum
    pub fn max_size(&self) -> usize {
        self.config.max_attackers
    }

    /// Whether the pool reached the configured maximum
    pub fn is_full(&self) -> bool {
        self.units.len() >= self.config.max_attackers
    }

    /// Create, set up and start one more attacker
    ///
    /// A setup failure is logged and the instance discarded; the pool simply
    /// stays smaller. Returns whether a unit was added.
    pub async fn spawn(&mut self) -> bool {
        self.attempts += 1;
        let id = self.attempts;
        debug!(attacker = id, "Setting up attacker");

        let mut attack = self.factory.create();
        if let Err(e) = attack.setup(&self.config).await {
            warn!(attacker = id, error = %e, "Attacker setup failed, discarding it");
            return false;
        }

        let handle = tokio::spawn(run_unit(
            id,
            attack,
            self.signals.clone(),
            self.outcomes.clone(),
            self.config.call_timeout,
        ));
        self.units.push(Unit { id, handle });
        debug!(attacker = id, pool_size = self.units.len(), "Attacker spawned");
        true
    }

    /// Attempt spawns until the pool reaches `desired`, never past the maximum
    ///
    /// Every attempt counts, failed setups included. Returns the number of
    /// units added.
    pub async fn grow_to(&mut self, desired: usize) -> usize {
        let target = desired.min(self.config.max_attackers);
        let missing = target.saturating_sub(self.units.len());
        let mut added = 0;
        for _ in 0..missing {
            if self.spawn().await {
                added += 1;
            }
        }
        added
    }

    /// Send exactly one quit signal to every live unit
    ///
    /// A unit in the middle of a call receives its signal once the call
    /// completes. Returns the number of signals accepted.
    pub async fn retire(&self, dispatcher: &Dispatcher) -> usize {
        let live = self
            .units
            .iter()
            .filter(|unit| !unit.handle.is_finished())
            .count();
        info!(attackers = live, "Stopping attackers");

        let mut signalled = 0;
        for _ in 0..live {
            if !dispatcher.quit(self.config.shutdown_timeout).await {
                warn!(
                    signalled,
                    live,
                    timeout = ?self.config.shutdown_timeout,
                    "Attacker did not return to waiting in time"
                );
                break;
            }
            signalled += 1;
        }
        signalled
    }

    /// Join every unit and tear its instance down
    ///
    /// Failures are logged and never stop the remaining teardowns. Returns
    /// the number of instances torn down cleanly.
    pub async fn teardown(self) -> usize {
        let Self { units, config, .. } = self;
        info!(attackers = units.len(), "Tearing down attackers");

        let mut clean = 0;
        for Unit { id, mut handle } in units {
            let mut attack = match tokio::time::timeout(config.shutdown_timeout, &mut handle).await
            {
                Ok(Ok(attack)) => attack,
                Ok(Err(e)) => {
                    error!(attacker = id, error = %e, "Attacker task failed, nothing to tear down");
                    continue;
                }
                Err(_) => {
                    handle.abort();
                    error!(attacker = id, "Attacker did not stop in time, aborted");
                    continue;
                }
            };

            match attack.teardown().await {
                Ok(()) => clean += 1,
                Err(e) => error!(attacker = id, error = %e, "Failed to tear down attacker"),
            }
        }
        clean
    }
}

/// Execution unit: serve dispatch signals until quit
async fn run_unit(
    id: usize,
    mut attack: Box<dyn Attack>,
    signals: Signals,
    outcomes: mpsc::Sender<CallOutcome>,
    call_timeout: Option<Duration>,
) -> Box<dyn Attack> {
    loop {
        tokio::select! {
            // an accepted dispatch is always served before a pending quit
            biased;
            signal = signals.dispatch.recv_async() => {
                let Ok(Dispatch { target }) = signal else { break };
                let outcome = perform(attack.as_mut(), call_timeout, target).await;
                if outcomes.send(outcome).await.is_err() {
                    break;
                }
            }
            _ = signals.quit.recv_async() => break,
        }
    }

    debug!(attacker = id, "Attacker retired");
    attack
}

/// Run one call, bounded by `call_timeout`, and time it
///
/// On timeout the call future is dropped and a timeout error is recorded.
pub(crate) async fn perform(
    attack: &mut dyn Attack,
    call_timeout: Option<Duration>,
    target: AggregationTarget,
) -> CallOutcome {
    let started_at = Utc::now();
    let begin = Instant::now();

    let result = match call_timeout {
        Some(limit) => tokio::time::timeout(limit, attack.call())
            .await
            .unwrap_or_else(|_| CallResult::timed_out(limit)),
        None => attack.call().await,
    };

    CallOutcome::new(result, started_at, begin.elapsed(), target)
}

//! Single-consumer metrics pipeline
//!
//! One task owns the `label -> Metrics` map and drains the outcome channel
//! for the whole run, so the map is never shared and never locked.
//!
//! Redirection during ramp-up is explicit: every outcome carries the
//! [`AggregationTarget`] of the dispatch signal that caused it, and the
//! consumer routes on that tag. Step outcomes go to the ramp-up record and
//! never reach the cumulative map. Closing a step hands the finalized record
//! back and starts a fresh one, so a call still in flight when its step
//! closes is counted in the step during which it completes. Calls slower
//! than a step therefore still show up as a (low) achieved rate.
//!
//! ```text
//!  units ──outcome──▶ ┌───────────────┐
//!                     │   consumer    │──▶ Step(n)     → transient record
//!  runner ─command──▶ │ (single task) │──▶ Cumulative  → label map
//!                     └───────────────┘
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::attack::{AggregationTarget, CallOutcome};
use crate::error::{Result, RunnerError};
use crate::metrics::{Metrics, MetricsMap};

enum Command {
    OpenStep {
        step: u32,
        ready: oneshot::Sender<()>,
    },
    CloseStep {
        step: u32,
        reply: oneshot::Sender<Metrics>,
    },
}

/// Handle to the consumer task
pub struct Aggregator {
    commands: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<MetricsMap>,
}

impl Aggregator {
    /// Start the consumer; it runs until every outcome sender is dropped
    pub fn spawn(outcomes: mpsc::Receiver<CallOutcome>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(consume(outcomes, command_rx));
        Self { commands, handle }
    }

    /// Mark `step` as the open ramp-up step
    ///
    /// Returns once the consumer has switched, so no outcome of the step
    /// can arrive before its record exists.
    pub async fn open_step(&self, step: u32) {
        let (ready, rx) = oneshot::channel();
        if self.commands.send(Command::OpenStep { step, ready }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Close `step` and return its finalized record
    ///
    /// Outcomes already queued when this is called are counted first.
    /// Step outcomes arriving afterwards go to the next step's record.
    pub async fn close_step(&self, step: u32) -> Metrics {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::CloseStep { step, reply }).is_err() {
            return Metrics::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Wait for the outcome channel to close and return the finalized map
    pub async fn finish(self) -> Result<MetricsMap> {
        drop(self.commands);
        self.handle
            .await
            .map_err(|e| RunnerError::Aggregator(e.to_string()))
    }
}

#[derive(Default)]
struct Consumer {
    cumulative: MetricsMap,
    /// Step currently open
    open: Option<u32>,
    /// Ramp-up record, present from the first opened step on
    ramp: Option<Metrics>,
    dropped: u64,
}

impl Consumer {
    fn route(&mut self, outcome: CallOutcome) {
        match outcome.target {
            AggregationTarget::Cumulative => {
                self.cumulative
                    .entry(outcome.label().to_string())
                    .or_default()
                    .add(&outcome);
            }
            AggregationTarget::Step(_) => match &mut self.ramp {
                Some(metrics) => metrics.add(&outcome),
                None => self.dropped += 1,
            },
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::OpenStep { step, ready } => {
                self.open = Some(step);
                self.ramp.get_or_insert_with(Metrics::new);
                let _ = ready.send(());
            }
            Command::CloseStep { step, reply } => {
                let mut metrics = if self.open == Some(step) {
                    self.open = None;
                    self.ramp.replace(Metrics::new()).unwrap_or_default()
                } else {
                    Metrics::new()
                };
                metrics.finalize();
                let _ = reply.send(metrics);
            }
        }
    }

    fn finish(mut self) -> MetricsMap {
        let late = self.ramp.as_ref().map_or(0, |m| m.requests);
        if self.dropped + late > 0 {
            debug!(
                dropped = self.dropped + late,
                "Discarded ramp-up outcomes that completed after the last step"
            );
        }
        for metrics in self.cumulative.values_mut() {
            metrics.finalize();
        }
        self.cumulative
    }
}

async fn consume(
    mut outcomes: mpsc::Receiver<CallOutcome>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> MetricsMap {
    let mut consumer = Consumer::default();

    loop {
        tokio::select! {
            // Drain queued outcomes before acting on a command
            biased;
            outcome = outcomes.recv() => match outcome {
                Some(outcome) => consumer.route(outcome),
                None => break,
            },
            Some(command) = commands.recv() => consumer.handle(command),
        }
    }

    consumer.finish()
}

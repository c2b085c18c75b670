//! Rate-paced dispatch
//!
//! The dispatcher owns the sending side of the two control channels. Both
//! are `flume::bounded(0)` rendezvous channels shared by every execution
//! unit: a dispatch signal only goes out when some unit is Waiting for it,
//! so an undersized pool stalls dispatch and the achieved rate drops below
//! the target. Ramp-up watches for exactly that.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::attack::AggregationTarget;

/// "Perform one call now"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Where the resulting outcome is aggregated
    pub target: AggregationTarget,
}

/// Receiving side of the control channels, cloned into every unit
#[derive(Debug, Clone)]
pub struct Signals {
    pub(crate) dispatch: flume::Receiver<Dispatch>,
    pub(crate) quit: flume::Receiver<()>,
}

/// Sending side of the control channels
#[derive(Debug)]
pub struct Dispatcher {
    dispatch: flume::Sender<Dispatch>,
    quit: flume::Sender<()>,
}

/// Create a dispatcher and the signals its units listen on
pub fn control_channels() -> (Dispatcher, Signals) {
    let (dispatch_tx, dispatch_rx) = flume::bounded(0);
    let (quit_tx, quit_rx) = flume::bounded(0);
    (
        Dispatcher {
            dispatch: dispatch_tx,
            quit: quit_tx,
        },
        Signals {
            dispatch: dispatch_rx,
            quit: quit_rx,
        },
    )
}

/// Token bucket paced at `rate` per second with no burst
///
/// Each phase builds its own limiter; limiters are never shared.
fn limiter(rate: u32) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rate).allow_burst(NonZeroU32::MIN))
}

impl Dispatcher {
    /// Dispatch at `rate` signals/second for `window`, tagging each with `target`
    ///
    /// Returns the number of signals a unit accepted. A handoff still
    /// pending at the deadline is abandoned.
    pub async fn run(&self, rate: u32, window: Duration, target: AggregationTarget) -> u64 {
        let limiter = limiter(rate);
        let deadline = Instant::now() + window;
        let mut accepted = 0;

        while Instant::now() < deadline {
            tokio::select! {
                _ = limiter.until_ready() => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }

            match tokio::time::timeout_at(deadline, self.dispatch.send_async(Dispatch { target }))
                .await
            {
                Ok(Ok(())) => accepted += 1,
                Ok(Err(_)) => {
                    warn!("Dispatch channel closed, no attacker can receive signals");
                    break;
                }
                // no unit became idle before the deadline
                Err(_) => break,
            }
        }

        debug!(rate, accepted, ?target, "Dispatch window finished");
        accepted
    }

    /// Hand one quit signal to a Waiting unit, waiting at most `limit`
    pub async fn quit(&self, limit: Duration) -> bool {
        matches!(
            tokio::time::timeout(limit, self.quit.send_async(())).await,
            Ok(Ok(()))
        )
    }
}

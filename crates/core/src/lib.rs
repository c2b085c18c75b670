// Load Generation Runner
//
// This crate drives user-supplied attacks at a target rate for a fixed
// duration and aggregates per-label latency and error metrics.
//
// Key design decisions:
// - Attacks are trait objects created by a factory, one instance per execution unit
// - Dispatch uses unbuffered rendezvous channels so an undersized pool shows up as a rate shortfall
// - A single consumer task owns all metrics; ramp-up steps are routed by a tag on each outcome
// - Setup/teardown failures are logged and tolerated; only configuration errors abort a run
// - The report is built once, after every attacker has been torn down
//
//   RunConfig ──▶ Runner ──▶ AttackerPool ◀── Dispatcher (governor-paced)
//                   │            │ outcomes
//                   │            ▼
//                   │        Aggregator ──▶ MetricsMap
//                   ▼
//               RunReport ──▶ report::write_report (json | yaml | text)

pub mod aggregator;
pub mod attack;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod rampup;
pub mod report;
pub mod runner;

// Re-exports for convenience
pub use attack::{AggregationTarget, Attack, AttackFactory, CallOutcome, CallResult, TIMEOUT_LABEL};
pub use config::RunConfig;
pub use error::{Result, RunnerError};
pub use metrics::{LatencySummary, Metrics, MetricsMap};
pub use rampup::{RampUpStrategy, RampUpSummary};
pub use report::{write_report, ReportFormat, RunReport};
pub use runner::Runner;

//! End-to-end runs against in-process attacks
//!
//! These run in real time (a few seconds each) because pacing is the
//! thing under test.
//!
//! Run with: cargo test -p stampede-core --test runner_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stampede_core::{
    Attack, CallResult, RampUpStrategy, RunConfig, Runner, RunnerError, TIMEOUT_LABEL,
};

#[derive(Default)]
struct Counters {
    setups: AtomicUsize,
    calls: AtomicUsize,
    teardowns: AtomicUsize,
}

/// Attack that sleeps for a fixed time per call
struct Sleeper {
    counters: Arc<Counters>,
    delay: Duration,
    fail_setup: bool,
}

#[async_trait]
impl Attack for Sleeper {
    async fn setup(&mut self, _config: &RunConfig) -> anyhow::Result<()> {
        if self.fail_setup {
            anyhow::bail!("refusing to start");
        }
        self.counters.setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn call(&mut self) -> CallResult {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        CallResult::success("sleep").with_status(200)
    }

    async fn teardown(&mut self) -> anyhow::Result<()> {
        self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn sleeper_runner(delay: Duration, fail_setup: bool, config: RunConfig) -> (Runner, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let shared = counters.clone();
    let runner = Runner::new(
        move || {
            Box::new(Sleeper {
                counters: shared.clone(),
                delay,
                fail_setup,
            }) as Box<dyn Attack>
        },
        config,
    );
    (runner, counters)
}

#[test_log::test(tokio::test)]
async fn test_steady_state_matches_target_rate() {
    let config = RunConfig::new(20, Duration::from_secs(2)).with_max_attackers(4);
    let (runner, counters) = sleeper_runner(Duration::ZERO, false, config);

    let report = runner.run().await.unwrap();

    let requests = report.total_requests();
    assert!((30..=45).contains(&requests), "requests = {}", requests);
    assert_eq!(requests as usize, counters.calls.load(Ordering::SeqCst));
    assert_eq!(report.total_errors(), 0);
    assert_eq!(report.metrics["sleep"].status_codes[&200], requests);
    assert!(report.finished_at > report.started_at);
}

#[test_log::test(tokio::test)]
async fn test_setup_always_failing_still_completes() {
    let config = RunConfig::new(10, Duration::from_secs(2))
        .with_ramp_up(Duration::from_secs(1))
        .with_max_attackers(4);
    let (runner, counters) = sleeper_runner(Duration::ZERO, true, config);

    let report = runner.run().await.unwrap();

    assert_eq!(report.attackers, 0);
    assert!(report.metrics.is_empty());
    assert_eq!(report.ramp_up.as_ref().map(|r| r.last_requests), Some(0));
    assert_eq!(counters.calls.load(Ordering::SeqCst), 0);
    assert_eq!(counters.teardowns.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn test_ramp_up_calls_are_not_reported() {
    let config = RunConfig::new(10, Duration::from_secs(3))
        .with_ramp_up(Duration::from_secs(2))
        .with_max_attackers(4);
    let (runner, counters) = sleeper_runner(Duration::ZERO, false, config);

    let report = runner.run().await.unwrap();

    let total_calls = counters.calls.load(Ordering::SeqCst) as u64;
    let reported = report.total_requests();
    // two steps at 5/s and 10/s happen before the one-second steady state
    assert!(total_calls >= reported + 10, "calls {} reported {}", total_calls, reported);
    assert!(reported <= 13, "reported {}", reported);

    let ramp_up = report.ramp_up.unwrap();
    assert_eq!(ramp_up.steps, 2);
    assert_eq!(ramp_up.last_target, 10);
}

#[test_log::test(tokio::test)]
async fn test_slow_attack_grows_pool_up_to_max() {
    // one attacker manages about 5 calls/sec
    let config = RunConfig::new(40, Duration::from_secs(4))
        .with_ramp_up(Duration::from_secs(3))
        .with_max_attackers(3)
        .with_strategy(RampUpStrategy::SpawnAsNeeded);
    let (runner, counters) = sleeper_runner(Duration::from_millis(200), false, config);

    let report = runner.run().await.unwrap();

    assert_eq!(report.attackers, 3);
    assert!(report.ramp_up.as_ref().unwrap().reached_max);
    assert_eq!(counters.setups.load(Ordering::SeqCst), 3);
    // every unit was retired and torn down
    assert_eq!(counters.teardowns.load(Ordering::SeqCst), 3);
}

#[test_log::test(tokio::test)]
async fn test_calls_slower_than_a_step_still_grow_the_pool() {
    // every call outlives the one-second step that dispatched it
    let config = RunConfig::new(10, Duration::from_secs(5))
        .with_ramp_up(Duration::from_secs(4))
        .with_max_attackers(20)
        .without_call_timeout();
    let (runner, counters) = sleeper_runner(Duration::from_millis(1200), false, config);

    let report = runner.run().await.unwrap();

    let ramp_up = report.ramp_up.as_ref().unwrap();
    assert!(report.attackers > 1, "pool stayed at {}", report.attackers);
    assert!(report.attackers <= 20);
    assert!(ramp_up.last_requests > 0);
    assert!(ramp_up.last_rate > 0.0);
    assert_eq!(
        counters.teardowns.load(Ordering::SeqCst),
        counters.setups.load(Ordering::SeqCst)
    );
}

#[test_log::test(tokio::test)]
async fn test_linear_ramp_up_multiplies_pool() {
    let config = RunConfig::new(40, Duration::from_secs(3))
        .with_ramp_up(Duration::from_secs(2))
        .with_max_attackers(20);
    let (runner, counters) = sleeper_runner(Duration::from_millis(200), false, config);

    let report = runner.run().await.unwrap();

    assert!(report.attackers > 1, "pool never grew");
    assert!(report.attackers <= 20);
    assert_eq!(
        counters.teardowns.load(Ordering::SeqCst),
        counters.setups.load(Ordering::SeqCst)
    );
}

#[test_log::test(tokio::test)]
async fn test_call_timeout_is_recorded_as_error() {
    let config = RunConfig::new(4, Duration::from_secs(1))
        .with_max_attackers(2)
        .with_call_timeout(Duration::from_millis(50));
    let (runner, _) = sleeper_runner(Duration::from_secs(10), false, config);

    let report = runner.run().await.unwrap();

    let timeouts = &report.metrics[TIMEOUT_LABEL];
    assert!(timeouts.requests > 0);
    assert_eq!(timeouts.errors, timeouts.requests);
    assert!(!report.metrics.contains_key("sleep"));
}

#[test_log::test(tokio::test)]
async fn test_sample_mode_does_not_pace() {
    let config = RunConfig::new(1, Duration::from_secs(60));
    let (runner, counters) = sleeper_runner(Duration::ZERO, false, config);

    let start = std::time::Instant::now();
    let outcomes = runner.sample(3).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 3);
    assert_eq!(counters.teardowns.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_ramp_up_longer_than_duration_is_rejected() {
    let config = RunConfig::new(10, Duration::from_secs(2)).with_ramp_up(Duration::from_secs(5));
    let (runner, counters) = sleeper_runner(Duration::ZERO, false, config);

    match runner.run().await {
        Err(RunnerError::InvalidConfig(problems)) => {
            assert_eq!(problems.len(), 1);
            assert!(problems[0].contains("ramp-up"));
        }
        other => panic!("expected invalid config, got {:?}", other.map(|r| r.run_id)),
    }
    assert_eq!(counters.setups.load(Ordering::SeqCst), 0);
}

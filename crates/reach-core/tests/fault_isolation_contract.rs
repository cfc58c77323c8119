//! Contract Test: Fault Isolation
//!
//! Constraints verified:
//! - A prober error, timeout or panic costs one cycle, never the worker
//! - A skipped cycle neither counts as a failure nor resets the run
//! - One target's trouble never stalls another target's worker
//! - A full update stream drops transitions that are republished later

mod common;

use common::*;
use reach_core::{HealthState, ProbeManager, ResultsCache};
use std::collections::HashSet;
use std::sync::Arc;

fn manager(
    prober: Arc<ScriptedProber>,
    failure_threshold: u32,
    capacity: usize,
) -> (ProbeManager, ResultsCache) {
    let results = ResultsCache::new(capacity);
    let manager = ProbeManager::new(results.clone(), prober, spec(failure_threshold));
    (manager, results)
}

async fn assert_skipped_cycle_is_neutral(skipped: Step) {
    let prober = ScriptedProber::new(vec![
        Step::unreachable(&["1.1.1.1"]),
        skipped,
        Step::unreachable(&["1.1.1.1"]),
    ]);
    let (manager, results) = manager(prober.clone(), 2, 20);
    let mut updates = results.updates().unwrap();
    skip_startup_jitter().await;

    manager.add(&target("web", &["1.1.1.1"])).await.unwrap();

    run_cycles(2).await;
    assert!(drain(&mut updates).is_empty());
    assert!(manager.exists(&key("web")).await, "worker survives");

    tokio::time::sleep(PERIOD).await;
    let published = drain(&mut updates);
    assert_eq!(published.len(), 1, "failures on both sides of the skip add up");
    assert_eq!(published[0].result, HealthState::Unhealthy);
    assert_eq!(prober.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn prober_error_skips_one_cycle() {
    assert_skipped_cycle_is_neutral(Step::Fail).await;
}

#[tokio::test(start_paused = true)]
async fn prober_panic_skips_one_cycle() {
    assert_skipped_cycle_is_neutral(Step::Panic).await;
}

#[tokio::test(start_paused = true)]
async fn hung_prober_times_out_and_skips_one_cycle() {
    assert_skipped_cycle_is_neutral(Step::Hang).await;
}

#[tokio::test(start_paused = true)]
async fn hung_target_does_not_stall_others() {
    let prober = ScriptedProber::new(vec![Step::Hang]);
    let (manager, _results) = manager(prober.clone(), 3, 20);
    skip_startup_jitter().await;

    manager.add(&target("a", &["1.1.1.1"])).await.unwrap();
    manager.add(&target("b", &["2.2.2.2"])).await.unwrap();
    run_cycles(3).await;

    assert_eq!(prober.call_count(), 6, "every worker probes every cycle");
    assert_eq!(manager.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_transition_is_republished_next_cycle() {
    let prober = ScriptedProber::new(vec![Step::unreachable(&["1.1.1.1", "2.2.2.2"])]);
    let (manager, results) = manager(prober, 1, 1);
    let mut updates = results.updates().unwrap();
    skip_startup_jitter().await;

    manager.add(&target("a", &["1.1.1.1"])).await.unwrap();
    manager.add(&target("b", &["2.2.2.2"])).await.unwrap();

    run_cycles(1).await;
    let first = drain(&mut updates);
    assert_eq!(first.len(), 1, "stream holds one event, the other is dropped");

    tokio::time::sleep(PERIOD).await;
    let second = drain(&mut updates);
    assert_eq!(second.len(), 1);

    let keys: HashSet<_> = first.iter().chain(&second).map(|u| u.key.clone()).collect();
    assert_eq!(keys, [key("a"), key("b")].into_iter().collect());

    tokio::time::sleep(PERIOD).await;
    assert!(drain(&mut updates).is_empty(), "nothing left to republish");
}

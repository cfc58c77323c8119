//! Test doubles and common utilities for contract tests
//!
//! Every test runs on a paused tokio clock, so probe periods and sync
//! debounces elapse instantly and deterministically.
#![allow(dead_code)]

use reach_core::error::{Error, Result};
use reach_core::store::MemoryTargetStore;
use reach_core::{
    HealthUpdate, ProbeSpec, Prober, ReachConfig, Reachability, Target, TargetKey, TargetStore,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What a [`ScriptedProber`] does on one call
#[derive(Debug, Clone)]
pub enum Step {
    /// The listed addresses are unreachable, every other one is reachable
    Unreachable(Vec<String>),
    /// The probe run fails as a whole
    Fail,
    /// The prober panics
    Panic,
    /// The prober never returns
    Hang,
}

impl Step {
    pub fn all_reachable() -> Self {
        Step::Unreachable(Vec::new())
    }

    pub fn unreachable(addresses: &[&str]) -> Self {
        Step::Unreachable(addresses.iter().map(|a| a.to_string()).collect())
    }
}

/// A prober that replays a script, repeating its last step forever
pub struct ScriptedProber {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    call_count: AtomicUsize,
    calls: Mutex<Vec<Vec<String>>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedProber {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(Step::all_reachable()),
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
        })
    }

    /// A prober that always reports everything reachable
    pub fn reachable() -> Arc<Self> {
        Self::new(Vec::new())
    }

    /// Append steps to the script
    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Get the number of times probe() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Address lists passed to each probe() call
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Clock reading at each probe() call
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = script.pop_front() {
            *last = step;
        }
        last.clone()
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, addresses: &[String]) -> Result<HashMap<String, Reachability>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(addresses.to_vec());
        self.call_times.lock().unwrap().push(Instant::now());

        match self.next_step() {
            Step::Unreachable(down) => Ok(addresses
                .iter()
                .map(|a| {
                    let reachable = !down.contains(a);
                    (a.clone(), Reachability::from_reachable(reachable))
                })
                .collect()),
            Step::Fail => Err(Error::prober("scripted failure")),
            Step::Panic => panic!("scripted prober panic"),
            Step::Hang => std::future::pending().await,
        }
    }

    fn prober_name(&self) -> &'static str {
        "scripted"
    }
}

/// A TargetStore that records every annotation write and can be made to fail
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryTargetStore,
    writes: Mutex<Vec<(TargetKey, Vec<String>)>>,
    write_attempts: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Underlying memory store, for seeding targets
    pub fn inner(&self) -> &MemoryTargetStore {
        &self.inner
    }

    pub async fn insert(&self, target: Target) {
        self.inner.insert(target).await;
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes, in order
    pub fn writes(&self) -> Vec<(TargetKey, Vec<String>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Get the number of times write_annotation() was called
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TargetStore for RecordingStore {
    async fn fetch_target(&self, key: &TargetKey) -> Result<Target> {
        self.inner.fetch_target(key).await
    }

    async fn write_annotation(&self, target: &Target, unreachable: &[String]) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("scripted write failure"));
        }

        self.inner.write_annotation(target, unreachable).await?;
        self.writes
            .lock()
            .unwrap()
            .push((target.key.clone(), unreachable.to_vec()));
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<Target>> {
        self.inner.list_targets().await
    }

    fn store_name(&self) -> &'static str {
        "recording"
    }
}

pub const PERIOD: Duration = Duration::from_secs(5);
pub const SYNC_PERIOD: Duration = Duration::from_secs(10);

/// Probe settings used by manager-level tests
pub fn spec(failure_threshold: u32) -> ProbeSpec {
    ProbeSpec {
        period: PERIOD,
        failure_threshold,
        timeout_per_address: Duration::from_secs(1),
    }
}

/// Helper to create a minimal ReachConfig for testing
///
/// Periodic resync is disabled so tests drive reconciliation explicitly.
pub fn minimal_config(failure_threshold: u32) -> ReachConfig {
    let mut config = ReachConfig::default();
    config.probe.period_secs = PERIOD.as_secs();
    config.probe.failure_threshold = failure_threshold;
    config.sync.period_secs = SYNC_PERIOD.as_secs();
    config.engine.resync_period_secs = 0;
    config
}

pub fn key(name: &str) -> TargetKey {
    TargetKey::new("default", name)
}

pub fn target(name: &str, addresses: &[&str]) -> Target {
    Target::new(key(name), addresses.iter().map(|a| a.to_string()).collect())
}

pub fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Move the clock past the startup window so workers skip their jitter
/// and probe exactly one period after being added
pub async fn skip_startup_jitter() {
    tokio::time::advance(PERIOD).await;
}

/// Let the clock run until just after the `n`-th probe cycle of a worker
/// added now
pub async fn run_cycles(n: u32) {
    tokio::time::sleep(PERIOD * n + Duration::from_millis(100)).await;
}

/// Let spawned tasks make progress without moving past the next tick
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Drain every update currently queued
pub fn drain(rx: &mut mpsc::Receiver<HealthUpdate>) -> Vec<HealthUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

//! Per-target probe worker
//!
//! A worker owns one target's probing: it ticks every period, runs the
//! prober, applies failure hysteresis per address and publishes the target's
//! aggregate health to the results cache, but only when it flips.
//!
//! ```text
//! Starting ──(jitter)──▶ Running ──stop / deletion / manager gone──▶ Stopping ──▶ Terminated
//!                          │  ▲
//!                          └──┘ tick: probe cycle
//!                               update: replace addresses
//!                               trigger: no-op
//! ```

use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::probe::manager::{ManagerShared, ProbeSpec};
use crate::results::{HealthState, ResultsCache, SetOutcome};
use crate::target::Target;
use crate::traits::{Prober, Reachability};

/// Hysteresis state of a single address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AddressRecord {
    /// Most recent observation
    pub(crate) last: Reachability,
    /// How many consecutive cycles observed `last`
    pub(crate) run: u32,
}

/// Hysteresis state of every address of one target
#[derive(Debug, Default)]
pub(crate) struct AddressRecords {
    records: HashMap<String, AddressRecord>,
}

impl AddressRecords {
    /// Fold one cycle's observations into the records
    pub(crate) fn observe(&mut self, results: &HashMap<String, Reachability>) {
        for (address, &result) in results {
            let record = self
                .records
                .entry(address.clone())
                .or_insert(AddressRecord { last: result, run: 0 });

            if record.last == result {
                record.run = record.run.saturating_add(1);
            } else {
                *record = AddressRecord { last: result, run: 1 };
            }
        }
    }

    /// Forget addresses that are no longer probed
    pub(crate) fn retain(&mut self, addresses: &[String]) {
        self.records
            .retain(|address, _| addresses.iter().any(|a| a == address));
    }

    /// Addresses unreachable for at least `threshold` consecutive cycles,
    /// sorted
    pub(crate) fn failing(&self, threshold: u32) -> Vec<String> {
        let mut failing: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.last == Reachability::Unreachable && r.run >= threshold)
            .map(|(address, _)| address.clone())
            .collect();
        failing.sort();
        failing
    }

    /// Current consecutive-failure count of an address
    #[cfg(test)]
    pub(crate) fn consecutive_failures(&self, address: &str) -> u32 {
        match self.records.get(address) {
            Some(r) if r.last == Reachability::Unreachable => r.run,
            _ => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, address: &str) -> Option<AddressRecord> {
        self.records.get(address).copied()
    }
}

/// Receiving ends of a worker's control channels
pub(crate) struct WorkerControl {
    pub(crate) stop_rx: mpsc::Receiver<()>,
    pub(crate) trigger_rx: mpsc::Receiver<()>,
    pub(crate) target_rx: watch::Receiver<Target>,
}

/// Why a worker's run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    Deleted,
    ManagerGone,
}

pub(crate) struct Worker {
    id: u64,
    target: Target,
    spec: ProbeSpec,
    prober: Arc<dyn Prober>,
    results: ResultsCache,
    manager: Weak<ManagerShared>,
    manager_start: Instant,
    control: WorkerControl,
    records: AddressRecords,
    /// Targets are presumed healthy until proven otherwise
    last_published: HealthState,
}

impl Worker {
    pub(crate) fn new(
        id: u64,
        target: Target,
        shared: &Arc<ManagerShared>,
        control: WorkerControl,
    ) -> Self {
        Self {
            id,
            target,
            spec: shared.spec,
            prober: Arc::clone(&shared.prober),
            results: shared.results.clone(),
            manager: Arc::downgrade(shared),
            manager_start: shared.start,
            control,
            records: AddressRecords::default(),
            last_published: HealthState::Healthy,
        }
    }

    /// Run the worker until it is stopped, then deregister it
    pub(crate) async fn run(mut self) {
        let exit = match self.startup_jitter().await {
            Some(exit) => exit,
            None => self.probe_loop().await,
        };

        match exit {
            Exit::Stopped => debug!("Stopping prober worker for {}", self.target.key),
            Exit::Deleted => debug!("Prober worker for {} finished after deletion", self.target.key),
            Exit::ManagerGone => debug!("Prober manager dropped, stopping worker for {}", self.target.key),
        }

        if let Some(manager) = self.manager.upgrade() {
            manager.remove_worker(&self.target.key, self.id).await;
        }
    }

    /// Spread out the first probes of workers added right after startup
    async fn startup_jitter(&mut self) -> Option<Exit> {
        let period = self.spec.period;
        if self.manager_start.elapsed() >= period {
            return None;
        }

        let jitter = period.mul_f64(rand::thread_rng().gen_range(0.0..1.0));
        trace!("Delaying first probe of {} by {:?}", self.target.key, jitter);

        tokio::select! {
            _ = time::sleep(jitter) => None,
            stop = self.control.stop_rx.recv() => Some(match stop {
                Some(()) => Exit::Stopped,
                None => Exit::ManagerGone,
            }),
        }
    }

    async fn probe_loop(&mut self) -> Exit {
        let period = self.spec.period;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                stop = self.control.stop_rx.recv() => {
                    return match stop {
                        Some(()) => Exit::Stopped,
                        None => Exit::ManagerGone,
                    };
                }
                _ = ticker.tick() => {
                    if !self.do_probe().await {
                        return Exit::Deleted;
                    }
                }
                trigger = self.control.trigger_rx.recv() => {
                    if trigger.is_none() {
                        return Exit::ManagerGone;
                    }
                    trace!("Manual trigger received for {}", self.target.key);
                }
                changed = self.control.target_rx.changed() => {
                    if changed.is_err() {
                        return Exit::ManagerGone;
                    }
                    self.apply_update();
                }
            }
        }
    }

    fn apply_update(&mut self) {
        let update = self.control.target_rx.borrow_and_update().clone();
        debug!(
            "Prober worker for {} now probing {:?} (deleting: {})",
            self.target.key, update.addresses, update.deleting
        );
        self.target.addresses = update.addresses;
        self.target.deleting = update.deleting;
    }

    /// Probe the target once and record the result
    ///
    /// Returns whether the worker should keep going.
    async fn do_probe(&mut self) -> bool {
        if self.target.deleting {
            info!(
                "Target {} deletion requested, setting probe result to healthy",
                self.target.key
            );
            self.results
                .set(&self.target.key, &self.target.addresses, HealthState::Healthy)
                .await;
            return false;
        }

        let Some(results) = self.run_prober().await else {
            return true;
        };

        self.records.observe(&results);
        self.records.retain(&self.target.addresses);

        let failing = self.records.failing(self.spec.failure_threshold);

        if failing.is_empty() && self.last_published == HealthState::Unhealthy {
            let addresses = self.target.addresses.clone();
            self.publish(&addresses, HealthState::Healthy).await;
        }
        if !failing.is_empty() && self.last_published == HealthState::Healthy {
            self.publish(&failing, HealthState::Unhealthy).await;
        }

        true
    }

    async fn publish(&mut self, addresses: &[String], result: HealthState) {
        match self.results.set(&self.target.key, addresses, result).await {
            SetOutcome::Dropped => {
                debug!(
                    "Result {} for {} not published, retrying next cycle",
                    result, self.target.key
                );
            }
            SetOutcome::Published | SetOutcome::Unchanged => {
                self.last_published = result;
                info!(
                    "Set probe result of {} to {} (addresses: {:?})",
                    self.target.key, result, addresses
                );
            }
        }
    }

    /// Run the prober on its own task, bounded in time
    ///
    /// Errors, timeouts and panics all mean "skip this cycle".
    async fn run_prober(&self) -> Option<HashMap<String, Reachability>> {
        let prober = Arc::clone(&self.prober);
        let addresses = self.target.addresses.clone();
        let bound = self.spec.probe_timeout(addresses.len());

        let mut handle = tokio::spawn(async move { prober.probe(&addresses).await });

        match time::timeout(bound, &mut handle).await {
            Ok(Ok(Ok(results))) => Some(results),
            Ok(Ok(Err(e))) => {
                warn!("Probe of {} failed, skipping cycle: {}", self.target.key, e);
                None
            }
            Ok(Err(e)) if e.is_panic() => {
                error!(
                    "Prober {} panicked while probing {}, skipping cycle",
                    self.prober.prober_name(),
                    self.target.key
                );
                None
            }
            Ok(Err(e)) => {
                warn!("Probe task of {} did not complete: {}", self.target.key, e);
                None
            }
            Err(_) => {
                handle.abort();
                warn!(
                    "Probe of {} timed out after {:?}, skipping cycle",
                    self.target.key, bound
                );
                None
            }
        }
    }
}

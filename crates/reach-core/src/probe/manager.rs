//! Worker registry
//!
//! The [`ProbeManager`] maps target keys to running probe workers and is the
//! only structure shared between them. It never waits for a worker: stopping
//! is a non-blocking signal and workers deregister themselves on exit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::probe::worker::{Worker, WorkerControl};
use crate::results::ResultsCache;
use crate::target::{Target, TargetKey, same_address_set};
use crate::traits::Prober;

/// Probe settings shared by every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSpec {
    /// Interval between probe cycles
    pub period: Duration,
    /// Consecutive failures before an address counts as unreachable
    pub failure_threshold: u32,
    /// Time allowed per address in one probe call
    pub timeout_per_address: Duration,
}

impl ProbeSpec {
    /// Upper bound for a probe call over `address_count` addresses
    pub fn probe_timeout(&self, address_count: usize) -> Duration {
        let count = u32::try_from(address_count.max(1)).unwrap_or(u32::MAX);
        self.timeout_per_address.saturating_mul(count)
    }
}

impl From<&ProbeConfig> for ProbeSpec {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            period: config.period(),
            failure_threshold: config.failure_threshold,
            timeout_per_address: config.timeout_per_address(),
        }
    }
}

/// Control end of a running worker
#[derive(Debug)]
struct WorkerHandle {
    /// Distinguishes successive workers registered under the same key
    id: u64,
    stop_tx: mpsc::Sender<()>,
    trigger_tx: mpsc::Sender<()>,
    target_tx: watch::Sender<Target>,
}

impl WorkerHandle {
    /// Signal the worker to stop
    ///
    /// Non-blocking and idempotent: a pending stop, or a worker that already
    /// exited, makes this a no-op.
    fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

/// State shared between the manager and (weakly) its workers
pub(crate) struct ManagerShared {
    workers: RwLock<HashMap<TargetKey, WorkerHandle>>,
    pub(super) results: ResultsCache,
    pub(super) prober: Arc<dyn Prober>,
    pub(super) spec: ProbeSpec,
    /// When the manager was created; workers added within one period of it
    /// get a startup jitter
    pub(super) start: Instant,
    next_id: AtomicU64,
}

impl ManagerShared {
    /// Called by a worker's own task after its loop exits
    ///
    /// Only removes the entry if it still belongs to the exiting worker, so a
    /// worker re-added under the same key is left alone.
    pub(crate) async fn remove_worker(&self, key: &TargetKey, id: u64) {
        let mut workers = self.workers.write().await;
        if workers.get(key).is_some_and(|handle| handle.id == id) {
            workers.remove(key);
            debug!("Removed prober worker for {}", key);
        }
    }
}

/// Registry of probe workers, one per target
///
/// Cloning is cheap; all clones manage the same workers. When the last clone
/// is dropped every worker observes its closed control channels and exits.
#[derive(Clone)]
pub struct ProbeManager {
    shared: Arc<ManagerShared>,
}

impl ProbeManager {
    /// Create a manager that publishes into `results` using `prober`
    pub fn new(results: ResultsCache, prober: Arc<dyn Prober>, spec: ProbeSpec) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                workers: RwLock::new(HashMap::new()),
                results,
                prober,
                spec,
                start: Instant::now(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Start probing a new target
    ///
    /// # Returns
    ///
    /// - `Ok(())`: A worker was registered and started
    /// - `Err(Error::AlreadyExists)`: A worker already probes this target
    /// - `Err(Error::InvalidAddress)`: An address is malformed; no worker created
    pub async fn add(&self, target: &Target) -> Result<()> {
        let mut workers = self.shared.workers.write().await;

        if workers.contains_key(&target.key) {
            warn!("Probe already exists for target {}", target.key);
            return Err(Error::already_exists(&target.key));
        }

        let addresses = target.parsed_addresses().map_err(|e| {
            warn!("Can't parse addresses of target {}: {}", target.key, e);
            e
        })?;

        let snapshot = Target {
            key: target.key.clone(),
            addresses,
            deleting: target.deleting,
        };

        // A new worker starts out Healthy; a result left behind by an
        // earlier worker for this key would swallow its first transition
        self.shared.results.remove(&target.key).await;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (target_tx, target_rx) = watch::channel(snapshot.clone());

        let worker = Worker::new(
            id,
            snapshot,
            &self.shared,
            WorkerControl {
                stop_rx,
                trigger_rx,
                target_rx,
            },
        );

        workers.insert(
            target.key.clone(),
            WorkerHandle {
                id,
                stop_tx,
                trigger_tx,
                target_tx,
            },
        );
        tokio::spawn(worker.run());

        info!("Started prober worker for {}", target.key);
        Ok(())
    }

    /// Check whether a worker is registered for the target
    pub async fn exists(&self, key: &TargetKey) -> bool {
        self.shared.workers.read().await.contains_key(key)
    }

    /// Hand a new snapshot of a target to its worker
    ///
    /// Only changes to the address set (ignoring order) or to the deletion
    /// flag are forwarded. A snapshot the worker has not consumed yet is
    /// replaced, so the worker always converges on the latest one.
    pub async fn update(&self, target: &Target) -> Result<()> {
        let desired = target.parsed_addresses().map_err(|e| {
            warn!("Can't parse addresses of target {}: {}", target.key, e);
            e
        })?;

        let workers = self.shared.workers.read().await;
        let Some(handle) = workers.get(&target.key) else {
            warn!("Probe does not exist for target {}", target.key);
            return Err(Error::not_found(&target.key));
        };

        let changed = handle.target_tx.send_if_modified(|current| {
            if current.deleting == target.deleting
                && same_address_set(&current.addresses, &desired)
            {
                return false;
            }
            current.addresses = desired;
            current.deleting = target.deleting;
            true
        });

        if changed {
            debug!("Sent updated addresses to prober worker for {}", target.key);
        }
        Ok(())
    }

    /// Stop the worker for a target, if there is one
    pub async fn remove(&self, key: &TargetKey) {
        let workers = self.shared.workers.read().await;
        match workers.get(key) {
            Some(handle) => {
                debug!("Removing target {} from prober manager", key);
                handle.stop();
            }
            None => debug!("No prober worker for {}, nothing to remove", key),
        }
    }

    /// Stop every worker whose target is not in `desired`
    ///
    /// # Returns
    ///
    /// The keys of the workers that were signalled
    pub async fn cleanup(&self, desired: &HashSet<TargetKey>) -> Vec<TargetKey> {
        let workers = self.shared.workers.read().await;
        let mut stopped = Vec::new();

        for (key, handle) in workers.iter() {
            if !desired.contains(key) {
                debug!("Cleaning up prober worker for {}", key);
                handle.stop();
                stopped.push(key.clone());
            }
        }

        stopped
    }

    /// Send the manual trigger signal to a worker
    ///
    /// The trigger is a reserved hook: workers accept it without changing
    /// state. Returns `false` if no worker is registered.
    pub async fn trigger(&self, key: &TargetKey) -> bool {
        let workers = self.shared.workers.read().await;
        match workers.get(key) {
            Some(handle) => {
                let _ = handle.trigger_tx.try_send(());
                true
            }
            None => false,
        }
    }

    /// Stop every worker
    pub async fn shutdown(&self) {
        let workers = self.shared.workers.read().await;
        info!("Stopping {} prober worker(s)", workers.len());
        for handle in workers.values() {
            handle.stop();
        }
    }

    /// Keys of all registered workers
    pub async fn keys(&self) -> Vec<TargetKey> {
        self.shared.workers.read().await.keys().cloned().collect()
    }

    /// Number of registered workers
    pub async fn len(&self) -> usize {
        self.shared.workers.read().await.len()
    }

    /// Check if no worker is registered
    pub async fn is_empty(&self) -> bool {
        self.shared.workers.read().await.is_empty()
    }

    /// The probe settings handed to every worker
    pub fn spec(&self) -> ProbeSpec {
        self.shared.spec
    }

    /// The results cache workers publish into
    pub fn results(&self) -> &ResultsCache {
        &self.shared.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_timeout_scales_with_addresses() {
        let spec = ProbeSpec {
            period: Duration::from_secs(5),
            failure_threshold: 3,
            timeout_per_address: Duration::from_secs(1),
        };
        assert_eq!(spec.probe_timeout(0), Duration::from_secs(1));
        assert_eq!(spec.probe_timeout(1), Duration::from_secs(1));
        assert_eq!(spec.probe_timeout(4), Duration::from_secs(4));
    }

    #[test]
    fn test_spec_from_config() {
        let spec = ProbeSpec::from(&ProbeConfig::default());
        assert_eq!(spec.period, Duration::from_secs(5));
        assert_eq!(spec.failure_threshold, 3);
        assert_eq!(spec.timeout_per_address, Duration::from_secs(1));
    }
}

//! Core reach engine
//!
//! The ReachEngine is responsible for:
//! - Owning the probe manager, results cache and sync dispatcher
//! - Reconciling targets from the target store onto probe workers
//! - Running the sync loop and periodic resync until shutdown
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────────────┐  reconcile / resync   ┌──────────────┐
//!  │ TargetStore │──────────────────────▶│ ProbeManager │── one worker per target
//!  └─────────────┘                       └──────────────┘
//!         ▲                                     │ probe, hysteresis
//!         │ write_annotation                    ▼
//!  ┌────────────────┐   HealthUpdate    ┌──────────────┐
//!  │ SyncDispatcher │◀──────────────────│ ResultsCache │
//!  └────────────────┘  (transitions)    └──────────────┘
//!         │
//!         ▼
//!   EngineEvent (monitoring)
//! ```
//!
//! ## Reconcile Rule
//!
//! 1. Target gone from the store → stop its worker, forget its result
//! 2. Target deletion-pending → stop its worker, forget its result
//! 3. No worker yet → add one
//! 4. Otherwise → forward the snapshot as an update

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ReachConfig;
use crate::error::{Error, Result};
use crate::probe::{ProbeManager, ProbeSpec};
use crate::results::ResultsCache;
use crate::sync::{SyncDispatcher, SyncEvent};
use crate::target::TargetKey;
use crate::traits::{Prober, TargetStore};

/// Events emitted by the ReachEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { targets_count: usize },

    /// A worker was started for a target
    TargetAdded { key: TargetKey },

    /// A target snapshot was forwarded to its worker
    TargetUpdated { key: TargetKey },

    /// A target's worker was stopped
    TargetRemoved { key: TargetKey },

    /// A full resync pass finished
    ResyncCompleted {
        targets_count: usize,
        removed_count: usize,
    },

    /// A health transition was synced (or not) to the target store
    Sync(SyncEvent),

    /// Engine stopped
    Stopped { reason: String },
}

/// What [`ReachEngine::reconcile`] did for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Added,
    Updated,
    Removed,
}

/// Core reach engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReachEngine::new()`]
/// 2. Drive targets through [`ReachEngine::manager()`] or let the periodic
///    resync pull them from the target store
/// 3. Start with [`ReachEngine::run()`]; it returns on SIGINT
///
/// ## Load Resistance
///
/// - **Bounded update stream**: full stream drops transitions, workers republish
/// - **Debounced sync**: at most one batch of store writes per sync period
/// - **Non-blocking events**: a full event channel drops events (logged)
pub struct ReachEngine {
    store: Arc<dyn TargetStore>,
    manager: ProbeManager,
    results: ResultsCache,
    dispatcher: SyncDispatcher,

    /// `None` when periodic resync is disabled
    resync_period: Option<Duration>,

    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReachEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        prober: Arc<dyn Prober>,
        store: Arc<dyn TargetStore>,
        config: ReachConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let results = ResultsCache::new(config.sync.update_channel_capacity);
        let manager = ProbeManager::new(results.clone(), prober, ProbeSpec::from(&config.probe));
        let dispatcher = SyncDispatcher::new(Arc::clone(&store), &config.sync, tx.clone());

        let resync_period = match config.engine.resync_period_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let engine = Self {
            store,
            manager,
            results,
            dispatcher,
            resync_period,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The worker registry
    pub fn manager(&self) -> &ProbeManager {
        &self.manager
    }

    /// The results cache
    pub fn results(&self) -> &ResultsCache {
        &self.results
    }

    /// The target store annotations are written to
    pub fn store(&self) -> &Arc<dyn TargetStore> {
        &self.store
    }

    /// Bring the worker of one target in line with the store
    pub async fn reconcile(&self, key: &TargetKey) -> Result<ReconcileAction> {
        let target = match self.store.fetch_target(key).await {
            Ok(target) => target,
            Err(e) if e.is_not_found() => {
                debug!("Target {} no longer exists", key);
                self.manager.remove(key).await;
                self.results.remove(key).await;
                self.emit_event(EngineEvent::TargetRemoved { key: key.clone() });
                return Ok(ReconcileAction::Removed);
            }
            Err(e) => return Err(e),
        };

        if target.deleting {
            self.manager.remove(key).await;
            self.results.remove(key).await;
            self.emit_event(EngineEvent::TargetRemoved { key: key.clone() });
            return Ok(ReconcileAction::Removed);
        }

        if !self.manager.exists(key).await {
            self.manager.add(&target).await?;
            self.emit_event(EngineEvent::TargetAdded { key: key.clone() });
            return Ok(ReconcileAction::Added);
        }

        self.manager.update(&target).await?;
        self.emit_event(EngineEvent::TargetUpdated { key: key.clone() });
        Ok(ReconcileAction::Updated)
    }

    /// Reconcile every target in the store and stop workers for the rest
    ///
    /// Per-target failures are logged and do not abort the pass.
    pub async fn resync(&self) -> Result<()> {
        let targets = self.store.list_targets().await?;
        let desired: HashSet<TargetKey> = targets.iter().map(|t| t.key.clone()).collect();

        for target in &targets {
            if let Err(e) = self.reconcile(&target.key).await {
                warn!("Failed to reconcile target {}: {}", target.key, e);
            }
        }

        let removed = self.manager.cleanup(&desired).await;
        for key in &removed {
            self.results.remove(key).await;
            self.emit_event(EngineEvent::TargetRemoved { key: key.clone() });
        }

        debug!(
            "Resync complete: {} targets, {} stale workers stopped",
            targets.len(),
            removed.len()
        );
        self.emit_event(EngineEvent::ResyncCompleted {
            targets_count: targets.len(),
            removed_count: removed.len(),
        });
        Ok(())
    }

    /// Run the engine until SIGINT
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The engine was already run once
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run the engine until the given signal fires, or SIGINT if `None`
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut updates = self
            .results
            .updates()
            .ok_or_else(|| Error::Other("Health update stream already taken".to_string()))?;

        if self.resync_period.is_some() {
            if let Err(e) = self.resync().await {
                warn!("Initial resync failed: {}", e);
            }
        }

        let targets_count = self.manager.len().await;
        info!("Reach engine started with {} target(s)", targets_count);
        self.emit_event(EngineEvent::Started { targets_count });

        let resync_every = self.resync_period.unwrap_or(Duration::from_secs(3600));
        let mut resync_ticker = time::interval_at(Instant::now() + resync_every, resync_every);
        resync_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let dispatcher = self.dispatcher.run(&mut updates);
        tokio::pin!(dispatcher);

        let shutdown = async {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
                _ = &mut dispatcher => {
                    warn!("Health update stream closed");
                    break "Update stream closed";
                }
                _ = resync_ticker.tick(), if self.resync_period.is_some() => {
                    if let Err(e) = self.resync().await {
                        warn!("Resync failed: {}", e);
                    }
                }
            }
        };

        self.manager.shutdown().await;
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("Reach engine stopped");

        Ok(())
    }

    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTargetStore;
    use crate::target::Target;
    use crate::traits::Reachability;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct AlwaysReachable;

    #[async_trait]
    impl Prober for AlwaysReachable {
        async fn probe(
            &self,
            addresses: &[String],
        ) -> std::result::Result<HashMap<String, Reachability>, Error> {
            Ok(addresses
                .iter()
                .map(|a| (a.clone(), Reachability::Reachable))
                .collect())
        }

        fn prober_name(&self) -> &'static str {
            "always-reachable"
        }
    }

    fn engine(store: &MemoryTargetStore) -> (ReachEngine, mpsc::Receiver<EngineEvent>) {
        ReachEngine::new(
            Arc::new(AlwaysReachable),
            Arc::new(store.clone()),
            ReachConfig::default(),
        )
        .unwrap()
    }

    fn web() -> Target {
        Target::new(TargetKey::new("default", "web"), vec!["10.0.0.1".to_string()])
    }

    #[tokio::test]
    async fn test_reconcile_follows_store() {
        let store = MemoryTargetStore::new();
        let (engine, _events) = engine(&store);
        let key = web().key;

        store.insert(web()).await;
        assert_eq!(engine.reconcile(&key).await.unwrap(), ReconcileAction::Added);
        assert!(engine.manager().exists(&key).await);

        store
            .insert(Target::new(key.clone(), vec!["10.0.0.2".to_string()]))
            .await;
        assert_eq!(engine.reconcile(&key).await.unwrap(), ReconcileAction::Updated);

        store.mark_deleting(&key).await;
        assert_eq!(engine.reconcile(&key).await.unwrap(), ReconcileAction::Removed);

        store.delete(&key).await;
        assert_eq!(engine.reconcile(&key).await.unwrap(), ReconcileAction::Removed);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ReachConfig::default();
        config.probe.failure_threshold = 0;

        let result = ReachEngine::new(
            Arc::new(AlwaysReachable),
            Arc::new(MemoryTargetStore::new()),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_engine_runs_once() {
        let store = MemoryTargetStore::new();
        let (engine, mut events) = engine(&store);

        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        engine.run_with_shutdown(Some(rx)).await.unwrap();

        let (_tx, rx) = oneshot::channel();
        assert!(engine.run_with_shutdown(Some(rx)).await.is_err());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&EngineEvent::Started { targets_count: 0 }));
        assert!(seen.contains(&EngineEvent::Stopped {
            reason: "Shutdown signal".to_string()
        }));
    }
}

//! Sync dispatcher
//!
//! Consumes the results cache's update stream and writes each health
//! transition onto the target's record in the [`TargetStore`].
//!
//! ## Debounce
//!
//! ```text
//! updates ──▶ [bounded queue] ──tick every sync period──▶ batch (≤ batch_size)
//!                                                           │ coalesce per target
//!                                                           ▼
//!                                          fetch_target ─▶ write_annotation
//! ```
//!
//! Events that do not fit in a batch stay queued for the next tick. Store
//! failures are logged and the event is dropped; the next transition or a
//! full resync writes the annotation again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::engine::EngineEvent;
use crate::results::{HealthState, HealthUpdate};
use crate::target::{TargetKey, join_addresses};
use crate::traits::TargetStore;

/// Outcome of syncing one health transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Annotation written; empty `unreachable` means it was cleared
    Written {
        key: TargetKey,
        unreachable: Vec<String>,
    },

    /// Nothing written (target is being deleted)
    Skipped { key: TargetKey, reason: String },

    /// Fetch or write failed; the transition was dropped
    Failed { key: TargetKey, error: String },
}

/// Batches health transitions into target store writes
pub struct SyncDispatcher {
    store: Arc<dyn TargetStore>,
    period: Duration,
    batch_size: usize,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncDispatcher {
    /// Create a dispatcher writing into `store`
    ///
    /// Sync outcomes are reported on `event_tx` without ever blocking.
    pub fn new(
        store: Arc<dyn TargetStore>,
        config: &SyncConfig,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            store,
            period: config.period(),
            batch_size: config.batch_size.max(1),
            event_tx,
        }
    }

    /// Run the debounce loop until the update stream closes
    pub async fn run(&self, updates: &mut mpsc::Receiver<HealthUpdate>) {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Sync dispatcher started (period: {:?}, batch size: {}) writing to {} store",
            self.period,
            self.batch_size,
            self.store.store_name()
        );

        loop {
            ticker.tick().await;
            if !self.tick(updates).await {
                debug!("Update stream closed, sync dispatcher exiting");
                return;
            }
        }
    }

    /// Drain and sync one batch
    ///
    /// Returns `false` once the update stream is closed and empty.
    pub async fn tick(&self, updates: &mut mpsc::Receiver<HealthUpdate>) -> bool {
        let (batch, open) = drain_batch(updates, self.batch_size);

        if !batch.is_empty() {
            debug!("Syncing {} health update(s)", batch.len());
        }
        for update in &batch {
            let event = self.sync_update(update).await;
            self.emit_event(EngineEvent::Sync(event));
        }

        open
    }

    /// Write one transition onto its target's record
    pub async fn sync_update(&self, update: &HealthUpdate) -> SyncEvent {
        let key = update.key.clone();

        let target = match self.store.fetch_target(&key).await {
            Ok(target) => target,
            Err(e) => {
                warn!("Failed to fetch target {}, dropping update: {}", key, e);
                return SyncEvent::Failed {
                    key,
                    error: e.to_string(),
                };
            }
        };

        if target.deleting {
            debug!("Target {} is being deleted, skipping update", key);
            return SyncEvent::Skipped {
                key,
                reason: "target is being deleted".to_string(),
            };
        }

        let unreachable = match update.result {
            HealthState::Unhealthy => update.addresses.clone(),
            _ => Vec::new(),
        };

        match self.store.write_annotation(&target, &unreachable).await {
            Ok(()) => {
                info!(
                    "Updated unreachable addresses of {} to [{}]",
                    key,
                    join_addresses(&unreachable)
                );
                SyncEvent::Written { key, unreachable }
            }
            Err(e) => {
                warn!("Failed to update target {}, dropping update: {}", key, e);
                SyncEvent::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping sync event");
        }
    }
}

/// Take up to `limit` queued updates, keeping only the latest per target
///
/// Returns the batch and whether the stream is still open.
fn drain_batch(
    updates: &mut mpsc::Receiver<HealthUpdate>,
    limit: usize,
) -> (Vec<HealthUpdate>, bool) {
    let mut batch: Vec<HealthUpdate> = Vec::new();
    let mut open = true;

    for _ in 0..limit {
        match updates.try_recv() {
            Ok(update) => match batch.iter_mut().find(|u| u.key == update.key) {
                Some(existing) => *existing = update,
                None => batch.push(update),
            },
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                open = false;
                break;
            }
        }
    }

    (batch, open)
}

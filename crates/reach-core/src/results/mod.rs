//! Results cache
//!
//! Holds the last published aggregate health of every target and turns
//! repeated observations into edge-triggered [`HealthUpdate`] events on a
//! single bounded stream.
//!
//! ## Overflow Policy
//!
//! [`ResultsCache::set`] never blocks. When the stream is full the new event
//! is dropped with a warning, the cache entry is rolled back, and the caller
//! gets [`SetOutcome::Dropped`]. Target workers treat that as "not published"
//! and publish again on their next cycle, so a slow dispatcher delays
//! transitions instead of stalling probes or losing them for good.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::target::TargetKey;

/// Aggregate health verdict of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HealthState {
    /// No verdict yet; never published
    #[default]
    Unknown,
    /// No address is over the failure threshold
    Healthy,
    /// At least one address is over the failure threshold
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// A published health transition
///
/// For `Unhealthy` the addresses are the ones over the failure threshold;
/// for `Healthy` they are the target's full address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthUpdate {
    /// Target the transition belongs to
    pub key: TargetKey,
    /// Addresses affected by the transition
    pub addresses: Vec<String>,
    /// New aggregate health
    pub result: HealthState,
}

/// What [`ResultsCache::set`] did with a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Same as the cached result (or `Unknown`); nothing emitted
    Unchanged,
    /// Cache updated and event queued
    Published,
    /// Event could not be queued; cache left as it was
    Dropped,
}

/// Last-published health per target, shared by all workers
///
/// Cloning is cheap and every clone shares the same cache and stream.
#[derive(Debug, Clone)]
pub struct ResultsCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    cache: RwLock<HashMap<TargetKey, HealthState>>,
    updates_tx: mpsc::Sender<HealthUpdate>,
    updates_rx: Mutex<Option<mpsc::Receiver<HealthUpdate>>>,
}

impl ResultsCache {
    /// Create an empty cache with a bounded update stream
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        Self {
            inner: Arc::new(CacheInner {
                cache: RwLock::new(HashMap::new()),
                updates_tx: tx,
                updates_rx: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Get the last published result for a target
    pub async fn get(&self, key: &TargetKey) -> Option<HealthState> {
        self.inner.cache.read().await.get(key).copied()
    }

    /// Record a result, emitting an update only if it differs from the cache
    pub async fn set(
        &self,
        key: &TargetKey,
        addresses: &[String],
        result: HealthState,
    ) -> SetOutcome {
        if result == HealthState::Unknown {
            debug!("Ignoring unknown result for {}", key);
            return SetOutcome::Unchanged;
        }

        let mut cache = self.inner.cache.write().await;
        let previous = cache.get(key).copied();
        if previous == Some(result) {
            return SetOutcome::Unchanged;
        }

        let update = HealthUpdate {
            key: key.clone(),
            addresses: addresses.to_vec(),
            result,
        };

        match self.inner.updates_tx.try_send(update) {
            Ok(()) => {
                cache.insert(key.clone(), result);
                SetOutcome::Published
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Update stream full, dropping {} transition of {}; it will be republished next cycle",
                    result, key
                );
                SetOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Update stream closed, dropping transition of {}", key);
                SetOutcome::Dropped
            }
        }
    }

    /// Drop the cached result for a target without emitting anything
    pub async fn remove(&self, key: &TargetKey) {
        self.inner.cache.write().await.remove(key);
    }

    /// Take the consumer end of the update stream
    ///
    /// There is exactly one consumer; every call after the first returns `None`.
    pub fn updates(&self) -> Option<mpsc::Receiver<HealthUpdate>> {
        self.inner
            .updates_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Number of cached results
    pub async fn len(&self) -> usize {
        self.inner.cache.read().await.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.cache.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TargetKey {
        TargetKey::new("default", "web")
    }

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_repeated_results_emit_once() {
        let cache = ResultsCache::new(20);
        let mut rx = cache.updates().unwrap();

        for _ in 0..5 {
            cache.set(&key(), &addrs(&["1.1.1.1"]), HealthState::Unhealthy).await;
        }

        let update = rx.try_recv().unwrap();
        assert_eq!(update.result, HealthState::Unhealthy);
        assert_eq!(update.addresses, addrs(&["1.1.1.1"]));
        assert!(rx.try_recv().is_err(), "only the transition is emitted");
        assert_eq!(cache.get(&key()).await, Some(HealthState::Unhealthy));
    }

    #[tokio::test]
    async fn test_only_transitions_emit() {
        let cache = ResultsCache::new(20);
        let mut rx = cache.updates().unwrap();

        let sequence = [
            HealthState::Healthy,
            HealthState::Healthy,
            HealthState::Unhealthy,
            HealthState::Unhealthy,
            HealthState::Healthy,
        ];
        for result in sequence {
            cache.set(&key(), &[], result).await;
        }

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.result);
        }
        assert_eq!(
            seen,
            vec![HealthState::Healthy, HealthState::Unhealthy, HealthState::Healthy]
        );
    }

    #[tokio::test]
    async fn test_unknown_is_never_published() {
        let cache = ResultsCache::new(20);
        let mut rx = cache.updates().unwrap();

        let outcome = cache.set(&key(), &[], HealthState::Unknown).await;
        assert_eq!(outcome, SetOutcome::Unchanged);
        assert!(rx.try_recv().is_err());
        assert_eq!(cache.get(&key()).await, None);
    }

    #[tokio::test]
    async fn test_remove_does_not_emit_and_allows_republish() {
        let cache = ResultsCache::new(20);
        let mut rx = cache.updates().unwrap();

        cache.set(&key(), &[], HealthState::Healthy).await;
        cache.remove(&key()).await;
        assert!(cache.is_empty().await);

        cache.set(&key(), &[], HealthState::Healthy).await;
        assert_eq!(rx.try_recv().unwrap().result, HealthState::Healthy);
        assert_eq!(rx.try_recv().unwrap().result, HealthState::Healthy);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_stream_drops_and_rolls_back() {
        let cache = ResultsCache::new(1);
        let mut rx = cache.updates().unwrap();
        let other = TargetKey::new("default", "db");

        assert_eq!(
            cache.set(&key(), &[], HealthState::Unhealthy).await,
            SetOutcome::Published
        );
        assert_eq!(
            cache.set(&other, &[], HealthState::Unhealthy).await,
            SetOutcome::Dropped
        );
        assert_eq!(cache.get(&other).await, None, "dropped result is not cached");

        rx.recv().await.unwrap();
        assert_eq!(
            cache.set(&other, &[], HealthState::Unhealthy).await,
            SetOutcome::Published
        );
    }

    #[test]
    fn test_updates_has_a_single_consumer() {
        let cache = ResultsCache::new(4);
        assert!(cache.updates().is_some());
        assert!(cache.updates().is_none());
    }
}

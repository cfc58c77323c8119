// # Memory Target Store
//
// In-memory implementation of TargetStore.
//
// ## Purpose
//
// Holds target definitions and their annotations in a HashMap. Nothing
// survives a restart. Useful for tests, for embedding the engine in a
// process that feeds targets itself, and as the daemon's default store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StoreConfig;
use crate::store::StoredTarget;
use crate::target::{Target, TargetKey};
use crate::traits::{TargetStore, TargetStoreFactory};

/// In-memory target store
///
/// Cloning is cheap; clones share the same targets.
///
/// # Example
///
/// ```rust,no_run
/// use reach_core::store::MemoryTargetStore;
/// use reach_core::{Target, TargetKey, TargetStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryTargetStore::new();
///     let key = TargetKey::new("default", "web");
///
///     store.insert(Target::new(key.clone(), vec!["10.0.0.1".to_string()])).await;
///
///     let target = store.fetch_target(&key).await?;
///     store.write_annotation(&target, &["10.0.0.1".to_string()]).await?;
///     assert_eq!(store.annotation(&key).await, Some(vec!["10.0.0.1".to_string()]));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetStore {
    inner: Arc<RwLock<HashMap<TargetKey, StoredTarget>>>,
}

impl MemoryTargetStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a target definition
    ///
    /// An existing annotation is kept.
    pub async fn insert(&self, target: Target) {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&target.key) {
            Some(stored) => {
                stored.addresses = target.addresses;
                stored.deleting = target.deleting;
            }
            None => {
                guard.insert(target.key.clone(), StoredTarget::from(target));
            }
        }
    }

    /// Flag a target as deletion-pending
    ///
    /// Returns `false` if the target does not exist.
    pub async fn mark_deleting(&self, key: &TargetKey) -> bool {
        match self.inner.write().await.get_mut(key) {
            Some(stored) => {
                stored.deleting = true;
                true
            }
            None => false,
        }
    }

    /// Remove a target entirely
    pub async fn delete(&self, key: &TargetKey) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    /// Read back the annotation of a target
    pub async fn annotation(&self, key: &TargetKey) -> Option<Vec<String>> {
        self.inner
            .read()
            .await
            .get(key)
            .map(|stored| stored.unreachable.clone())
    }

    /// Full stored record of a target
    pub async fn get(&self, key: &TargetKey) -> Option<StoredTarget> {
        self.inner.read().await.get(key).cloned()
    }

    /// Number of targets in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn fetch_target(&self, key: &TargetKey) -> Result<Target, Error> {
        let guard = self.inner.read().await;
        guard
            .get(key)
            .map(StoredTarget::to_target)
            .ok_or_else(|| Error::not_found(key))
    }

    async fn write_annotation(&self, target: &Target, unreachable: &[String]) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let stored = guard
            .get_mut(&target.key)
            .ok_or_else(|| Error::not_found(&target.key))?;
        stored.annotate(unreachable);
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, Error> {
        let guard = self.inner.read().await;
        let mut targets: Vec<Target> = guard.values().map(StoredTarget::to_target).collect();
        targets.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(targets)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for [`MemoryTargetStore`]
pub struct MemoryTargetStoreFactory;

#[async_trait]
impl TargetStoreFactory for MemoryTargetStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn TargetStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemoryTargetStore::new())),
            other => Err(Error::config(format!(
                "Memory store factory cannot build a '{}' store",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn target(name: &str, addresses: &[&str]) -> Target {
        Target::new(
            TargetKey::new("default", name),
            addresses.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryTargetStore::new();
        assert!(store.is_empty().await);

        store.insert(target("web", &["10.0.0.1"])).await;
        assert_eq!(store.len().await, 1);

        let key = TargetKey::new("default", "web");
        let fetched = store.fetch_target(&key).await.unwrap();
        assert_eq!(fetched.addresses, vec!["10.0.0.1".to_string()]);
        assert!(!fetched.deleting);

        assert!(store.delete(&key).await);
        assert!(store.fetch_target(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_annotation_write_and_clear() {
        let store = MemoryTargetStore::new();
        let web = target("web", &["10.0.0.1", "10.0.0.2"]);
        store.insert(web.clone()).await;

        store
            .write_annotation(&web, &["10.0.0.2".to_string()])
            .await
            .unwrap();
        assert_eq!(
            store.annotation(&web.key).await,
            Some(vec!["10.0.0.2".to_string()])
        );
        assert!(store.get(&web.key).await.unwrap().last_synced.is_some());

        assert_ok!(store.write_annotation(&web, &[]).await);
        assert_eq!(store.annotation(&web.key).await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_reinsert_keeps_annotation() {
        let store = MemoryTargetStore::new();
        let web = target("web", &["10.0.0.1"]);
        store.insert(web.clone()).await;
        store
            .write_annotation(&web, &["10.0.0.1".to_string()])
            .await
            .unwrap();

        store.insert(target("web", &["10.0.0.1", "10.0.0.3"])).await;
        let stored = store.get(&web.key).await.unwrap();
        assert_eq!(stored.addresses.len(), 2);
        assert_eq!(stored.unreachable, vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_write_to_missing_target_fails() {
        let store = MemoryTargetStore::new();
        let err = assert_err!(store.write_annotation(&target("ghost", &[]), &[]).await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_and_mark_deleting() {
        let store = MemoryTargetStore::new();
        store.insert(target("b", &[])).await;
        store.insert(target("a", &[])).await;
        assert!(store.mark_deleting(&TargetKey::new("default", "b")).await);
        assert!(!store.mark_deleting(&TargetKey::new("default", "zzz")).await);

        let listed = store.list_targets().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key.name, "a");
        assert!(listed[1].deleting);
    }
}

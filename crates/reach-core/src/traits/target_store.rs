// # Target Store Trait
//
// Defines the interface to the external record store that holds target
// definitions and receives the "unreachable addresses" annotation.
//
// ## Implementations
//
// - In-memory: `reach_core::store::MemoryTargetStore`
// - JSON file: `reach_core::store::FileTargetStore`
// - Future: orchestrator APIs, key-value stores
//
// ## Usage
//
// ```rust,ignore
// use reach_core::{TargetKey, TargetStore};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* TargetStore implementation */;
//
//     let target = store.fetch_target(&TargetKey::new("default", "web")).await?;
//     store.write_annotation(&target, &["10.0.0.1".to_string()]).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::target::{Target, TargetKey};

/// Trait for target store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Failure Semantics
///
/// Every method is fallible and every failure is treated as transient by the
/// engine: the sync dispatcher drops the update and relies on the next health
/// change (or the next resync pass) to write again. Stores must not retry
/// internally.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Fetch the current definition of a target
    ///
    /// # Returns
    ///
    /// - `Ok(Target)`: The current snapshot, including its deletion flag
    /// - `Err(Error::NotFound)`: The target does not exist
    /// - `Err(Error)`: Any other store failure
    async fn fetch_target(&self, key: &TargetKey) -> Result<Target, crate::Error>;

    /// Write the unreachable-addresses annotation onto a target
    ///
    /// An empty `unreachable` list clears the annotation.
    async fn write_annotation(
        &self,
        target: &Target,
        unreachable: &[String],
    ) -> Result<(), crate::Error>;

    /// List every target currently defined
    ///
    /// Used by full resync passes to rebuild and garbage-collect workers.
    async fn list_targets(&self) -> Result<Vec<Target>, crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}

/// Helper trait for constructing target stores from configuration
#[async_trait]
pub trait TargetStoreFactory: Send + Sync {
    /// Create a TargetStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn TargetStore>, crate::Error>;
}

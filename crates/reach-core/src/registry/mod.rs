//! Plugin registry
//!
//! The registry lets probers and target stores be registered by name at
//! runtime, so the daemon builds whatever the configuration names without
//! hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reach_core::registry::PluginRegistry;
//! use reach_core::config::{ProberConfig, StoreConfig};
//!
//! let registry = PluginRegistry::with_builtin_stores();
//! reach_probe_tcp::register(&registry);
//!
//! let prober = registry.create_prober(&ProberConfig::default())?;
//! let store = registry.create_store(&StoreConfig::Memory).await?;
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! // In reach-probe-tcp
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_prober("tcp", Box::new(TcpFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ProberConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::store::{FileTargetStoreFactory, MemoryTargetStoreFactory};
use crate::traits::{Prober, ProberFactory, TargetStore, TargetStoreFactory};

/// Name → factory maps for probers and target stores
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent lookups, exclusive
/// registration. A poisoned lock is recovered, since the maps are only ever
/// inserted into.
#[derive(Default)]
pub struct PluginRegistry {
    probers: RwLock<HashMap<String, Box<dyn ProberFactory>>>,

    /// Arc so the factory can be used after the lock is released
    stores: RwLock<HashMap<String, Arc<dyn TargetStoreFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryTargetStoreFactory));
        registry.register_store("file", Box::new(FileTargetStoreFactory));
        registry
    }

    /// Register a prober factory under a type name (e.g. "tcp")
    pub fn register_prober(&self, name: impl Into<String>, factory: Box<dyn ProberFactory>) {
        self.probers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a target store factory under a type name (e.g. "file")
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn TargetStoreFactory>) {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::from(factory));
    }

    /// Create a prober from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Prober>)`: Created prober instance
    /// - `Err(Error)`: If the prober type is not registered or creation fails
    pub fn create_prober(&self, config: &ProberConfig) -> Result<Box<dyn Prober>> {
        let prober_type = config.type_name();
        let probers = self.probers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = probers
            .get(prober_type)
            .ok_or_else(|| Error::config(format!("Unknown prober type: {}", prober_type)))?;

        factory.create(config)
    }

    /// Create a target store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TargetStore>)`: Created store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn TargetStore>> {
        let store_type = config.type_name();

        let factory = {
            let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
        };

        factory.create(config).await
    }

    /// List all registered prober types
    pub fn list_probers(&self) -> Vec<String> {
        let probers = self.probers.read().unwrap_or_else(PoisonError::into_inner);
        probers.keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a prober type is registered
    pub fn has_prober(&self, name: &str) -> bool {
        self.probers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        self.stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

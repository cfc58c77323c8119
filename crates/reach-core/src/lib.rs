// # reach-core
//
// Core library for the reachability-monitoring engine.
//
// ## Architecture Overview
//
// This library continuously probes the addresses of a dynamic set of
// targets and propagates only changes in their aggregate health:
// - **Prober**: Trait for checking whether addresses are reachable
// - **TargetStore**: Trait for the external record store (definitions in,
//   unreachable-address annotations out)
// - **ProbeManager**: Registry of per-target probe workers
// - **ResultsCache**: Last published health per target, edge-triggered events
// - **SyncDispatcher**: Debounced, batched writes of health transitions
// - **ReachEngine**: Owns the pieces above and reconciles targets from the store
// - **PluginRegistry**: Name-based construction of probers and stores
//
// ## Design Principles
//
// 1. **One task per target**: workers own their hysteresis state outright
// 2. **Edge-triggered**: only transitions leave the results cache
// 3. **Never block probing**: a slow store delays annotations, not probes
// 4. **Plugin-Based**: probers and stores are registered by name
// 5. **Library-First**: the daemon is a thin wrapper around this crate

pub mod config;
pub mod engine;
pub mod error;
pub mod probe;
pub mod registry;
pub mod results;
pub mod store;
pub mod sync;
pub mod target;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, ProbeConfig, ProberConfig, ReachConfig, StoreConfig, SyncConfig};
pub use engine::{EngineEvent, ReachEngine, ReconcileAction};
pub use error::{Error, Result};
pub use probe::{ProbeManager, ProbeSpec};
pub use registry::PluginRegistry;
pub use results::{HealthState, HealthUpdate, ResultsCache, SetOutcome};
pub use store::{FileTargetStore, MemoryTargetStore};
pub use sync::{SyncDispatcher, SyncEvent};
pub use target::{Target, TargetKey};
pub use traits::{Prober, ProberFactory, Reachability, TargetStore, TargetStoreFactory};

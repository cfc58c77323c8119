// # Target Store Implementations
//
// This module provides implementations of the TargetStore trait: an
// in-memory store for tests and embedding, and a JSON file store that
// persists annotations across restarts.

pub mod file;
pub mod memory;

pub use file::{FileTargetStore, FileTargetStoreFactory};
pub use memory::{MemoryTargetStore, MemoryTargetStoreFactory};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::{Target, TargetKey};

/// A target as held by a store, with its health annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTarget {
    /// Target identifier
    pub key: TargetKey,

    /// Addresses to probe
    pub addresses: Vec<String>,

    /// Deletion has been requested
    #[serde(default)]
    pub deleting: bool,

    /// Addresses currently annotated as unreachable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreachable: Vec<String>,

    /// When the annotation was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl StoredTarget {
    /// Snapshot handed to the engine
    pub fn to_target(&self) -> Target {
        Target {
            key: self.key.clone(),
            addresses: self.addresses.clone(),
            deleting: self.deleting,
        }
    }

    /// Replace the annotation and stamp the write time
    pub fn annotate(&mut self, unreachable: &[String]) {
        self.unreachable = unreachable.to_vec();
        self.last_synced = Some(Utc::now());
    }
}

impl From<Target> for StoredTarget {
    fn from(target: Target) -> Self {
        Self {
            key: target.key,
            addresses: target.addresses,
            deleting: target.deleting,
            unreachable: Vec::new(),
            last_synced: None,
        }
    }
}

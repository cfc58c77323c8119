//! Configuration types for the reach engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReachConfig {
    /// Prober configuration
    #[serde(default)]
    pub prober: ProberConfig,

    /// Target store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Probe cadence and hysteresis
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Sync dispatcher settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ReachConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.probe.validate()?;
        self.sync.validate()?;
        self.engine.validate()?;
        self.prober.validate()?;
        self.store.validate()?;

        // A connect must give up before the worker abandons the probe call
        if let ProberConfig::Tcp {
            connect_timeout_ms, ..
        } = &self.prober
        {
            if *connect_timeout_ms >= self.probe.timeout_per_address_ms {
                return Err(crate::Error::config(format!(
                    "TCP connect timeout ({} ms) must be below the probe timeout per address ({} ms)",
                    connect_timeout_ms, self.probe.timeout_per_address_ms
                )));
            }
        }
        Ok(())
    }
}

/// Probe cadence and failure hysteresis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// How often each target is probed (in seconds)
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Consecutive failures required before an address counts as unreachable
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time allowed per address for a single probe call (in milliseconds)
    ///
    /// A probe call over N addresses is bounded by N times this value.
    #[serde(default = "default_timeout_per_address_ms")]
    pub timeout_per_address_ms: u64,
}

impl ProbeConfig {
    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.period_secs == 0 {
            return Err(crate::Error::config("Probe period must be > 0"));
        }
        if self.failure_threshold == 0 {
            return Err(crate::Error::config("Probe failure threshold must be > 0"));
        }
        if self.timeout_per_address_ms == 0 {
            return Err(crate::Error::config("Probe timeout per address must be > 0"));
        }
        Ok(())
    }

    /// Probe interval as a duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Per-address probe timeout as a duration
    pub fn timeout_per_address(&self) -> Duration {
        Duration::from_millis(self.timeout_per_address_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            failure_threshold: default_failure_threshold(),
            timeout_per_address_ms: default_timeout_per_address_ms(),
        }
    }
}

/// Sync dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Debounce period between sync passes (in seconds)
    #[serde(default = "default_sync_period_secs")]
    pub period_secs: u64,

    /// Maximum number of queued health updates drained per sync pass
    ///
    /// Anything beyond this stays queued for the next pass, which bounds the
    /// write rate against the target store.
    #[serde(default = "default_sync_batch_size")]
    pub batch_size: usize,

    /// Capacity of the health update stream between the results cache and
    /// the dispatcher
    ///
    /// When full, new transitions are dropped (with a warning log) and
    /// republished by their worker on its next probe cycle.
    #[serde(default = "default_update_channel_capacity")]
    pub update_channel_capacity: usize,
}

impl SyncConfig {
    /// Validate the sync configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.period_secs == 0 {
            return Err(crate::Error::config("Sync period must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(crate::Error::config("Sync batch size must be > 0"));
        }
        if self.update_channel_capacity == 0 {
            return Err(crate::Error::config("Update channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Debounce period as a duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period_secs: default_sync_period_secs(),
            batch_size: default_sync_batch_size(),
            update_channel_capacity: default_update_channel_capacity(),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between full resync passes against the target store
    /// (in seconds)
    ///
    /// Set to 0 to disable periodic resync; the embedding application is then
    /// responsible for driving the lifecycle API.
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resync_period_secs: default_resync_period_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProberConfig {
    /// TCP connect prober
    Tcp {
        /// Port used for addresses that do not carry one
        #[serde(default = "default_tcp_port")]
        default_port: u16,
        /// Connect timeout (in milliseconds)
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },

    /// Custom prober
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProberConfig {
    /// Validate the prober configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProberConfig::Tcp {
                default_port,
                connect_timeout_ms,
            } => {
                if *default_port == 0 {
                    return Err(crate::Error::config("TCP prober default port must be > 0"));
                }
                if *connect_timeout_ms == 0 {
                    return Err(crate::Error::config("TCP prober connect timeout must be > 0"));
                }
                Ok(())
            }
            ProberConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom prober factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the prober type name
    pub fn type_name(&self) -> &str {
        match self {
            ProberConfig::Tcp { .. } => "tcp",
            ProberConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        ProberConfig::Tcp {
            default_port: default_tcp_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Target store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the targets file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            StoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

fn default_period_secs() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_timeout_per_address_ms() -> u64 {
    1000
}

fn default_sync_period_secs() -> u64 {
    10
}

fn default_sync_batch_size() -> usize {
    1
}

fn default_update_channel_capacity() -> usize {
    20
}

fn default_resync_period_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_tcp_port() -> u16 {
    80
}

fn default_connect_timeout_ms() -> u64 {
    750
}

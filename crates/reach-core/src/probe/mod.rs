//! Probe workers and their registry
//!
//! [`ProbeManager`] is the lifecycle API the control plane drives; each
//! registered target gets its own worker task that probes, applies failure
//! hysteresis and publishes transitions to the
//! [`ResultsCache`](crate::results::ResultsCache).

pub mod manager;
mod worker;

pub use manager::{ProbeManager, ProbeSpec};

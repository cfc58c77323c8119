//! Core traits for the reach engine
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Prober`]: Check whether addresses are reachable
//! - [`TargetStore`]: Fetch target definitions and write health annotations

pub mod prober;
pub mod target_store;

pub use prober::{Prober, ProberFactory, Reachability};
pub use target_store::{TargetStore, TargetStoreFactory};

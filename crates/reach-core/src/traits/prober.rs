// # Prober Trait
//
// Defines the interface for checking whether addresses are reachable.
//
// ## Implementations
//
// - TCP connect: `reach-probe-tcp` crate
// - Future: ICMP echo, HTTP GET, gRPC health
//
// ## Usage
//
// ```rust,ignore
// use reach_core::Prober;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let prober = /* Prober implementation */;
//
//     let results = prober.probe(&["10.0.0.1".to_string()]).await?;
//     for (address, reachability) in results {
//         println!("{address}: {reachability:?}");
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;

/// Outcome of probing a single address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    /// The address answered
    Reachable,
    /// The address did not answer (or answered wrongly)
    Unreachable,
}

impl Reachability {
    /// Build from a boolean-like probe outcome
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Reachability::Reachable
        } else {
            Reachability::Unreachable
        }
    }
}

/// Trait for prober implementations
///
/// A prober answers one question: given these addresses, which of them are
/// reachable right now? It decides nothing else.
///
/// # Contract
///
/// - An address that could be probed appears in the result map exactly once.
///   Addresses missing from the map are left untouched by the worker for
///   that cycle.
/// - `Err` means the probing subsystem itself failed (e.g. raw socket
///   unavailable). The worker skips the cycle and tries again next period.
/// - The caller bounds every call with a timeout and runs it on its own task,
///   so a hung or panicking prober costs one cycle, never the worker.
///
/// # Forbidden
///
/// - Keeping hysteresis or result history (owned by the target worker)
/// - Retrying on its own (the next cycle is the retry)
/// - Spawning long-lived background tasks
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe each address once
    ///
    /// # Parameters
    ///
    /// - `addresses`: The addresses to probe, already validated
    ///
    /// # Returns
    ///
    /// - `Ok(map)`: Per-address reachability
    /// - `Err(Error)`: The probe run as a whole failed
    async fn probe(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, Reachability>, crate::Error>;

    /// Get the prober name (for logging/debugging)
    fn prober_name(&self) -> &'static str;
}

/// Helper trait for constructing probers from configuration
pub trait ProberFactory: Send + Sync {
    /// Create a Prober instance from configuration
    fn create(
        &self,
        config: &crate::config::ProberConfig,
    ) -> Result<Box<dyn Prober>, crate::Error>;
}

// # TCP Prober
//
// This crate provides a TCP-connect prober for the reach engine.
//
// ## Purpose
//
// An address counts as reachable when a TCP connection to it can be opened
// within the connect timeout. The connection is dropped right away; nothing
// is written to it.
//
// ## Addresses
//
// - `10.0.0.1:8080`, `[fd00::1]:443`: probed as given
// - `10.0.0.1`, `fd00::1`: probed on the configured default port
// - `db.internal:5432`, `db.internal`: resolved first; the first resolved
//   address is probed
//
// An address that cannot be resolved fails the whole probe call, so the
// worker skips the cycle instead of counting a resolver outage as an
// unreachable target.

use reach_core::PluginRegistry;
use reach_core::config::ProberConfig;
use reach_core::traits::{Prober, ProberFactory, Reachability};
use reach_core::{Error, Result};

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time;

/// Default port for addresses without one
pub const DEFAULT_PORT: u16 = 80;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(750);

/// TCP-connect prober
#[derive(Debug, Clone)]
pub struct TcpProber {
    /// Port used for addresses that do not carry one
    default_port: u16,

    /// Time allowed for each connect
    connect_timeout: Duration,
}

impl TcpProber {
    /// Create a new TCP prober
    pub fn new(default_port: u16, connect_timeout: Duration) -> Self {
        Self {
            default_port,
            connect_timeout,
        }
    }

    /// Turn an address into the socket address to connect to
    async fn resolve(&self, address: &str) -> Result<SocketAddr> {
        if let Ok(socket) = address.parse::<SocketAddr>() {
            return Ok(socket);
        }
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.default_port));
        }

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::prober(format!("Invalid port in address '{}'", address))
                })?;
                (host, port)
            }
            None => (address, self.default_port),
        };

        let mut resolved = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::prober(format!("Failed to resolve '{}': {}", address, e)))?;

        resolved
            .next()
            .ok_or_else(|| Error::prober(format!("'{}' resolved to no addresses", address)))
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait::async_trait]
impl Prober for TcpProber {
    async fn probe(&self, addresses: &[String]) -> Result<HashMap<String, Reachability>> {
        let mut targets = Vec::with_capacity(addresses.len());
        for address in addresses {
            targets.push((address.clone(), self.resolve(address).await?));
        }

        let connect_timeout = self.connect_timeout;
        let mut connects = JoinSet::new();
        for (address, socket) in targets {
            connects.spawn(async move {
                let reachable = matches!(
                    time::timeout(connect_timeout, TcpStream::connect(socket)).await,
                    Ok(Ok(_))
                );
                tracing::trace!("TCP probe of {} ({}): reachable={}", address, socket, reachable);
                (address, Reachability::from_reachable(reachable))
            });
        }

        let mut results = HashMap::with_capacity(addresses.len());
        while let Some(joined) = connects.join_next().await {
            let (address, reachability) =
                joined.map_err(|e| Error::prober(format!("TCP probe task failed: {}", e)))?;
            results.insert(address, reachability);
        }

        Ok(results)
    }

    fn prober_name(&self) -> &'static str {
        "tcp"
    }
}

/// Factory for creating TCP probers
pub struct TcpFactory;

impl ProberFactory for TcpFactory {
    fn create(&self, config: &ProberConfig) -> Result<Box<dyn Prober>> {
        match config {
            ProberConfig::Tcp {
                default_port,
                connect_timeout_ms,
            } => Ok(Box::new(TcpProber::new(
                *default_port,
                Duration::from_millis(*connect_timeout_ms),
            ))),
            ProberConfig::Custom { config, .. } => {
                let default_port = config
                    .get("default_port")
                    .and_then(|v| v.as_u64())
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(DEFAULT_PORT);
                let connect_timeout = config
                    .get("connect_timeout_ms")
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
                Ok(Box::new(TcpProber::new(default_port, connect_timeout)))
            }
        }
    }
}

/// Register the TCP prober with a plugin registry
pub fn register(registry: &PluginRegistry) {
    registry.register_prober("tcp", Box::new(TcpFactory));
}

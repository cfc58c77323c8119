// # reachd - Reachability Daemon
//
// The reachd daemon is a thin integration layer responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering probers and target stores
// 4. Running the reach engine until SIGTERM/SIGINT
//
// All probing, hysteresis and sync logic lives in reach-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Prober
// - `REACH_PROBER_TYPE`: Type of prober (tcp)
// - `REACH_TCP_DEFAULT_PORT`: Port for addresses without one (default 80)
// - `REACH_TCP_CONNECT_TIMEOUT_MS`: Connect timeout, below REACH_PROBE_TIMEOUT_MS (default 750)
//
// ### Target Store
// - `REACH_STORE_TYPE`: Type of target store (file, memory)
// - `REACH_STORE_PATH`: Path to the targets file (for file store)
//
// ### Probing
// - `REACH_PROBE_PERIOD_SECS`: Probe period (default 5)
// - `REACH_PROBE_FAILURE_THRESHOLD`: Consecutive failures before unreachable (default 3)
// - `REACH_PROBE_TIMEOUT_MS`: Probe timeout per address (default 1000)
//
// ### Sync
// - `REACH_SYNC_PERIOD_SECS`: Debounce period of store writes (default 10)
// - `REACH_SYNC_BATCH_SIZE`: Updates written per sync period (default 1)
// - `REACH_UPDATE_CHANNEL_CAPACITY`: Queued health updates (default 20)
//
// ### Engine
// - `REACH_RESYNC_PERIOD_SECS`: Full resync against the store, 0 disables (default 30)
// - `REACH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export REACH_STORE_TYPE=file
// export REACH_STORE_PATH=/var/lib/reach/targets.json
// export REACH_TCP_DEFAULT_PORT=443
//
// reachd
// ```

use anyhow::{Context, Result};
use reach_core::config::{ProberConfig, ReachConfig, StoreConfig};
use reach_core::{EngineEvent, PluginRegistry, ReachEngine, SyncEvent};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ReachExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ReachExitCode> for ExitCode {
    fn from(code: ReachExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    prober_type: String,
    tcp_default_port: Option<u16>,
    tcp_connect_timeout_ms: Option<u64>,
    store_type: String,
    store_path: Option<String>,
    probe_period_secs: Option<u64>,
    probe_failure_threshold: Option<u32>,
    probe_timeout_ms: Option<u64>,
    sync_period_secs: Option<u64>,
    sync_batch_size: Option<usize>,
    update_channel_capacity: Option<usize>,
    resync_period_secs: Option<u64>,
    log_level: String,
}

/// Read an optional numeric environment variable
///
/// Unset means "use the default"; set but unparsable is an error.
fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a number. Got: '{}'", name, value)),
        Err(_) => Ok(None),
    }
}

/// Check that an optional value lies in `range`
fn check_range<T>(name: &str, value: Option<T>, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    match value {
        Some(value) if !range.contains(&value) => anyhow::bail!(
            "{} must be between {} and {}. Got: {}",
            name,
            range.start(),
            range.end(),
            value
        ),
        _ => Ok(()),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            prober_type: env::var("REACH_PROBER_TYPE").unwrap_or_else(|_| "tcp".to_string()),
            tcp_default_port: env_number("REACH_TCP_DEFAULT_PORT")?,
            tcp_connect_timeout_ms: env_number("REACH_TCP_CONNECT_TIMEOUT_MS")?,
            store_type: env::var("REACH_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_path: env::var("REACH_STORE_PATH").ok(),
            probe_period_secs: env_number("REACH_PROBE_PERIOD_SECS")?,
            probe_failure_threshold: env_number("REACH_PROBE_FAILURE_THRESHOLD")?,
            probe_timeout_ms: env_number("REACH_PROBE_TIMEOUT_MS")?,
            sync_period_secs: env_number("REACH_SYNC_PERIOD_SECS")?,
            sync_batch_size: env_number("REACH_SYNC_BATCH_SIZE")?,
            update_channel_capacity: env_number("REACH_UPDATE_CHANNEL_CAPACITY")?,
            resync_period_secs: env_number("REACH_RESYNC_PERIOD_SECS")?,
            log_level: env::var("REACH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks enumerations, required fields and numeric ranges before
    /// anything is started.
    fn validate(&self) -> Result<()> {
        match self.prober_type.as_str() {
            "tcp" => {}
            _ => anyhow::bail!(
                "REACH_PROBER_TYPE '{}' is not supported. Supported probers: tcp",
                self.prober_type
            ),
        }

        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "REACH_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                self.store_type
            ),
        }

        if self.store_type == "file" {
            match self.store_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "REACH_STORE_PATH is required when REACH_STORE_TYPE=file. \
                    Set it via: export REACH_STORE_PATH=/var/lib/reach/targets.json"
                ),
                Some(path) => {
                    let parent = std::path::Path::new(path).parent();
                    if let Some(parent) = parent.filter(|p| !p.as_os_str().is_empty()) {
                        if !parent.exists() {
                            anyhow::bail!(
                                "REACH_STORE_PATH parent directory does not exist: {}. \
                                Create it first: sudo mkdir -p {}",
                                parent.display(),
                                parent.display()
                            );
                        }
                    }
                }
            }
        }

        check_range("REACH_TCP_DEFAULT_PORT", self.tcp_default_port, 1..=u16::MAX)?;
        check_range("REACH_TCP_CONNECT_TIMEOUT_MS", self.tcp_connect_timeout_ms, 10..=60_000)?;
        check_range("REACH_PROBE_PERIOD_SECS", self.probe_period_secs, 1..=3600)?;
        check_range("REACH_PROBE_FAILURE_THRESHOLD", self.probe_failure_threshold, 1..=100)?;
        check_range("REACH_PROBE_TIMEOUT_MS", self.probe_timeout_ms, 10..=60_000)?;
        check_range("REACH_SYNC_PERIOD_SECS", self.sync_period_secs, 1..=3600)?;
        check_range("REACH_SYNC_BATCH_SIZE", self.sync_batch_size, 1..=1000)?;
        check_range("REACH_UPDATE_CHANNEL_CAPACITY", self.update_channel_capacity, 1..=100_000)?;
        check_range("REACH_RESYNC_PERIOD_SECS", self.resync_period_secs, 0..=86_400)?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "REACH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the engine configuration, defaults filled in by reach-core
    fn to_reach_config(&self) -> ReachConfig {
        let mut config = ReachConfig::new();

        if let ProberConfig::Tcp {
            default_port,
            connect_timeout_ms,
        } = &mut config.prober
        {
            if let Some(port) = self.tcp_default_port {
                *default_port = port;
            }
            if let Some(timeout) = self.tcp_connect_timeout_ms {
                *connect_timeout_ms = timeout;
            }
        }

        config.store = match self.store_type.as_str() {
            "file" => StoreConfig::File {
                path: self.store_path.clone().unwrap_or_default(),
            },
            _ => StoreConfig::Memory,
        };

        if let Some(v) = self.probe_period_secs {
            config.probe.period_secs = v;
        }
        if let Some(v) = self.probe_failure_threshold {
            config.probe.failure_threshold = v;
        }
        if let Some(v) = self.probe_timeout_ms {
            config.probe.timeout_per_address_ms = v;
        }
        if let Some(v) = self.sync_period_secs {
            config.sync.period_secs = v;
        }
        if let Some(v) = self.sync_batch_size {
            config.sync.batch_size = v;
        }
        if let Some(v) = self.update_channel_capacity {
            config.sync.update_channel_capacity = v;
        }
        if let Some(v) = self.resync_period_secs {
            config.engine.resync_period_secs = v;
        }

        config
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ReachExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ReachExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ReachExitCode::ConfigError.into();
    }

    info!("Starting reachd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ReachExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let engine = match build_engine(&config).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return ReachExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(engine).await {
            error!("Daemon error: {:#}", e);
            ReachExitCode::RuntimeError
        } else {
            ReachExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Register plugins and build the engine from configuration
async fn build_engine(
    config: &Config,
) -> Result<(ReachEngine, tokio::sync::mpsc::Receiver<EngineEvent>)> {
    let reach_config = config.to_reach_config();

    let registry = PluginRegistry::with_builtin_stores();

    #[cfg(feature = "tcp")]
    {
        debug!("Registering TCP prober");
        reach_probe_tcp::register(&registry);
    }

    let prober = registry
        .create_prober(&reach_config.prober)
        .context("Failed to create prober")?;
    let store = registry
        .create_store(&reach_config.store)
        .await
        .context("Failed to create target store")?;

    info!(
        "Prober: {}, target store: {}, probe period: {}s, failure threshold: {}",
        prober.prober_name(),
        store.store_name(),
        reach_config.probe.period_secs,
        reach_config.probe.failure_threshold
    );

    let engine = ReachEngine::new(Arc::from(prober), Arc::from(store), reach_config)
        .context("Failed to create engine")?;
    Ok(engine)
}

/// Run the engine until a shutdown signal arrives
async fn run_daemon(
    (engine, mut events): (ReachEngine, tokio::sync::mpsc::Receiver<EngineEvent>),
) -> Result<()> {
    // Surface sync outcomes at the daemon's log level
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Sync(SyncEvent::Failed { key, error }) => {
                    warn!("Annotation of {} not written: {}", key, error)
                }
                other => debug!("Engine event: {:?}", other),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signals = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling error, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let result = engine.run_with_shutdown(Some(shutdown_rx)).await;

    signals.abort();
    drop(engine);
    let _ = event_logger.await;

    result.context("Engine failed")?;
    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// The name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(received)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

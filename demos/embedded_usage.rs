//! Minimal embedding example for reach-core
//!
//! This example drives the reach engine from a custom application with an
//! in-memory target store and a prober whose answers the application
//! controls. One address goes down, gets annotated on its target, comes
//! back, and the annotation is cleared.

use reach_core::{
    EngineEvent, MemoryTargetStore, Prober, ReachConfig, ReachEngine, Reachability, Result,
    Target, TargetKey,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Prober that reports the addresses in `down` as unreachable
#[derive(Default)]
struct SwitchboardProber {
    down: Mutex<HashSet<String>>,
}

impl SwitchboardProber {
    fn set_down(&self, address: &str, down: bool) {
        let mut set = self.down.lock().unwrap_or_else(|e| e.into_inner());
        if down {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }
}

#[async_trait::async_trait]
impl Prober for SwitchboardProber {
    async fn probe(&self, addresses: &[String]) -> Result<HashMap<String, Reachability>> {
        let down = self.down.lock().unwrap_or_else(|e| e.into_inner());
        Ok(addresses
            .iter()
            .map(|a| (a.clone(), Reachability::from_reachable(!down.contains(a))))
            .collect())
    }

    fn prober_name(&self) -> &'static str {
        "switchboard"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded reach-core Example ===\n");

    let key = TargetKey::new("demo", "web");
    let store = MemoryTargetStore::new();
    store
        .insert(Target::new(
            key.clone(),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        ))
        .await;

    let prober = Arc::new(SwitchboardProber::default());

    // Fast cadence so the demo finishes in a few seconds
    let mut config = ReachConfig::new();
    config.probe.period_secs = 1;
    config.probe.failure_threshold = 2;
    config.sync.period_secs = 1;
    config.sync.batch_size = 10;
    config.engine.resync_period_secs = 0;

    println!("1. Creating engine...");
    let (engine, mut event_rx) =
        ReachEngine::new(prober.clone(), Arc::new(store.clone()), config)?;
    let engine = Arc::new(engine);

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
            if matches!(event, EngineEvent::Stopped { .. }) {
                break;
            }
        }
    });

    println!("2. Starting engine in background...");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runner = Arc::clone(&engine);
    let engine_handle =
        tokio::spawn(async move { runner.run_with_shutdown(Some(shutdown_rx)).await });

    engine.reconcile(&key).await?;

    println!("3. Taking 10.0.0.2 down...");
    prober.set_down("10.0.0.2", true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    println!(
        "   annotation: {:?}",
        store.annotation(&key).await.unwrap_or_default()
    );

    println!("4. Bringing 10.0.0.2 back...");
    prober.set_down("10.0.0.2", false);
    tokio::time::sleep(Duration::from_secs(4)).await;
    println!(
        "   annotation: {:?}",
        store.annotation(&key).await.unwrap_or_default()
    );

    println!("5. Stopping engine...");
    let _ = shutdown_tx.send(());
    match engine_handle.await {
        Ok(result) => result?,
        Err(e) => eprintln!("Engine task failed: {}", e),
    }
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    Ok(())
}

//! UWB Telemetry Collector
//!
//! Watches for allow-listed EVB1000 devices on USB serial ports, runs one
//! ingest worker per attached device, and logs decoded reports to CSV
//! with live progress meters. Runs until interrupted; on ctrl-c every
//! worker is stopped and its logs flushed before the process exits.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uwb_detect::AllowList;
use uwb_ingest::{CollectorSinks, DeviceManager};

/// Allow-list configuration path, overridable as the first argument
const DEFAULT_CONFIG: &str = "config.ini";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "uwb_collector=info,uwb_protocol=info,uwb_detect=info,uwb_ingest=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    // the allow-list is the one fatal input: without it there is no way
    // to tell which serial ports belong to the ranging system
    let allowlist = match AllowList::load(&config_path) {
        Ok(allowlist) => allowlist,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "loaded {} (VID, PID) pair(s) from {}",
        allowlist.len(),
        config_path
    );

    let sinks = Arc::new(CollectorSinks::new("."));
    let mut manager = DeviceManager::new(allowlist, sinks);

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    tracing::info!("collector running, press ctrl-c to stop");
    manager.run(shutdown_rx).await;

    // run() returns only after every worker stopped and flushed
    tracing::info!("collector stopped");
    Ok(())
}

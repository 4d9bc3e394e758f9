//! UWB Telemetry Ingest Library
//!
//! This crate turns attach/detach deltas from `uwb-detect` into running
//! telemetry: one isolated worker task per device, each owning its serial
//! connection, decoding lines with `uwb-protocol` and forwarding records
//! to its sinks (CSV logging, progress metering).
//!
//! # Architecture
//!
//! The [`DeviceManager`] runs a single cooperative control loop: poll the
//! port watcher once a second, spawn a [`worker`](crate::worker) per new
//! device, signal workers to stop on detach, and on shutdown wait for
//! every worker to flush and exit. Failure never crosses a worker
//! boundary — a dead port, a malformed line, or a failing sink affects
//! only the device that produced it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use uwb_detect::AllowList;
//! use uwb_ingest::{CollectorSinks, DeviceManager};
//!
//! # async fn run() {
//! let allowlist = AllowList::load("config.ini").unwrap();
//! let sinks = Arc::new(CollectorSinks::new("."));
//! let mut manager = DeviceManager::new(allowlist, sinks);
//!
//! let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
//! // send on shutdown_tx (e.g. from a ctrl-c handler) to stop
//! manager.run(shutdown_rx).await;
//! # }
//! ```

pub mod csv_log;
pub mod error;
pub mod manager;
pub mod progress;
pub mod sink;
pub mod worker;

pub use csv_log::CsvLogger;
pub use error::SinkError;
pub use manager::{DeviceManager, POLL_INTERVAL};
pub use progress::{ProgressRegistry, ProgressSink};
pub use sink::{RecordSink, SinkProvider};
pub use worker::{DeviceState, DeviceWorker, WorkerCommand, WorkerHandle, BAUD_RATE};

use std::path::PathBuf;

use uwb_detect::{DeviceId, PortDescriptor};

/// Default sink stack: a per-device CSV logger plus shared progress meters
pub struct CollectorSinks {
    log_dir: PathBuf,
    progress: ProgressRegistry,
}

impl CollectorSinks {
    /// Create the default stack logging into `log_dir`
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            progress: ProgressRegistry::new(),
        }
    }

    /// The shared progress registry
    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }
}

impl SinkProvider for CollectorSinks {
    fn sinks_for(&self, _id: DeviceId, _port: &PortDescriptor) -> Vec<Box<dyn RecordSink>> {
        vec![
            Box::new(CsvLogger::new(self.log_dir.clone())),
            Box::new(self.progress.sink()),
        ]
    }
}

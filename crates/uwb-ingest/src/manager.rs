//! Device lifecycle manager
//!
//! Single-threaded cooperative control loop: poll the port watcher at a
//! fixed cadence, spawn a worker per newly attached allow-listed port,
//! signal workers to stop on detach, and on shutdown stop everything and
//! wait for every worker to finish. The loop never awaits worker I/O;
//! worker teardown proceeds asynchronously through a draining list.
//!
//! Re-attach of a port whose previous worker is still draining is
//! deferred to a later tick, so the old worker never races the new one
//! for the serial device.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use uwb_detect::{AllowList, DeviceId, PortDelta, PortDescriptor, PortWatcher};

use crate::sink::SinkProvider;
use crate::worker::{DeviceWorker, WorkerHandle};

/// Default watcher poll cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Composes the port watcher with a registry of device workers
pub struct DeviceManager {
    watcher: PortWatcher,
    sinks: Arc<dyn SinkProvider>,
    registry: HashMap<DeviceId, WorkerHandle>,
    /// Stopped-but-not-yet-finished workers awaiting reap
    draining: Vec<WorkerHandle>,
    /// Attaches deferred while their DeviceId is still draining
    deferred: Vec<PortDescriptor>,
    poll_interval: Duration,
}

impl DeviceManager {
    /// Create a manager for allow-listed devices
    pub fn new(allowlist: AllowList, sinks: Arc<dyn SinkProvider>) -> Self {
        Self {
            watcher: PortWatcher::new(allowlist),
            sinks,
            registry: HashMap::new(),
            draining: Vec::new(),
            deferred: Vec::new(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the poll cadence (tests use a short one)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Number of currently registered workers
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Ids of currently registered workers
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.registry.keys().copied().collect()
    }

    /// Run until the shutdown signal fires, then stop and wait for all
    /// workers
    ///
    /// This is the process's main loop; it returns only after every
    /// worker has reached its terminal state and flushed its sinks.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        let mut tick = interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tick.tick() => {
                    let delta = self.watcher.poll();
                    self.apply_delta(delta).await;
                }
            }
        }

        self.shutdown_all().await;
    }

    /// Apply one poll's attach/detach delta and run periodic housekeeping
    pub async fn apply_delta(&mut self, delta: PortDelta) {
        self.reap_draining().await;

        for port in delta.detached {
            self.detach(&port);
        }

        // deferred attaches first: their detach happened on an earlier tick
        let deferred = std::mem::take(&mut self.deferred);
        for port in deferred {
            self.attach(port);
        }
        for port in delta.attached {
            self.attach(port);
        }
    }

    fn attach(&mut self, port: PortDescriptor) {
        let id = DeviceId::fingerprint(&port);

        // rapid reconnect can replay an attach for a live worker
        if self.registry.contains_key(&id) {
            warn!("attach for already-registered device {} ({}), ignoring", id, port);
            return;
        }

        // serialize stop-then-start per device: wait for the old worker
        // to release the port before opening it again
        if self.draining.iter().any(|h| h.id() == id && !h.is_finished()) {
            debug!("device {} still draining, deferring attach of {}", id, port);
            self.deferred.push(port);
            return;
        }

        info!("new device connected (port {})", port);
        let sinks = self.sinks.sinks_for(id, &port);
        let handle = DeviceWorker::spawn(id, port, sinks);
        self.registry.insert(id, handle);
    }

    fn detach(&mut self, port: &PortDescriptor) {
        let id = DeviceId::fingerprint(port);

        // a deferred attach whose port vanished again never starts
        self.deferred.retain(|p| DeviceId::fingerprint(p) != id);

        match self.registry.remove(&id) {
            Some(handle) => {
                info!("device disconnected (port {})", port);
                handle.signal_stop();
                self.draining.push(handle);
            }
            None => {
                warn!("detach for unknown device {} ({}), ignoring", id, port);
            }
        }
    }

    /// Join workers whose tasks have already finished
    async fn reap_draining(&mut self) {
        let mut still_draining = Vec::new();
        for handle in self.draining.drain(..) {
            if handle.is_finished() {
                // finished task: join resolves immediately
                handle.join().await;
            } else {
                still_draining.push(handle);
            }
        }
        self.draining = still_draining;
    }

    /// Stop every worker and wait for each to reach its terminal state
    ///
    /// The only point that guarantees all sink buffers are flushed.
    pub async fn shutdown_all(&mut self) {
        info!("stopping {} device worker(s)", self.registry.len());

        for handle in self.registry.values() {
            handle.signal_stop();
        }
        for (_, handle) in self.registry.drain() {
            handle.join().await;
        }
        for handle in self.draining.drain(..) {
            handle.join().await;
        }
        self.deferred.clear();

        info!("all device workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;
    use crate::sink::RecordSink;
    use crate::worker::DeviceState;

    /// Provider handing every device a shared recording sink
    struct RecordingProvider(RecordingSink);

    impl SinkProvider for RecordingProvider {
        fn sinks_for(&self, _id: DeviceId, _port: &PortDescriptor) -> Vec<Box<dyn RecordSink>> {
            vec![Box::new(self.0.clone())]
        }
    }

    fn manager_with(sink: RecordingSink) -> DeviceManager {
        let allowlist = AllowList::from_str("CONFIG_VID_PID\nVID PID\n0403 6001\n").unwrap();
        DeviceManager::new(allowlist, Arc::new(RecordingProvider(sink)))
    }

    fn port(path: &str) -> PortDescriptor {
        PortDescriptor {
            path: path.to_string(),
            vid: 0x0403,
            pid: 0x6001,
        }
    }

    fn attach_delta(ports: &[&str]) -> PortDelta {
        PortDelta {
            attached: ports.iter().map(|p| port(p)).collect(),
            detached: Vec::new(),
        }
    }

    fn detach_delta(ports: &[&str]) -> PortDelta {
        PortDelta {
            attached: Vec::new(),
            detached: ports.iter().map(|p| port(p)).collect(),
        }
    }

    #[tokio::test]
    async fn attach_registers_one_worker_per_port() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(attach_delta(&["/dev/ttyA", "/dev/ttyB"])).await;

        assert_eq!(manager.device_count(), 2);
        manager.shutdown_all().await;
        assert_eq!(manager.device_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_attach_is_a_noop() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;
        let ids = manager.device_ids();
        manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;

        assert_eq!(manager.device_count(), 1);
        assert_eq!(manager.device_ids(), ids);
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn detach_for_unknown_device_is_a_noop() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(detach_delta(&["/dev/ttyA"])).await;
        assert_eq!(manager.device_count(), 0);
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn detach_removes_from_registry_immediately() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;
        manager.apply_delta(detach_delta(&["/dev/ttyA"])).await;

        // removal is not gated on the worker reaching Stopped
        assert_eq!(manager.device_count(), 0);
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn reattach_yields_same_device_id() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;
        let before = manager.device_ids();

        manager.apply_delta(detach_delta(&["/dev/ttyA"])).await;
        // old worker may still be draining; keep ticking until the
        // deferred attach lands
        for _ in 0..50 {
            manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;
            manager.apply_delta(PortDelta::default()).await;
            if manager.device_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(manager.device_ids(), before);
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn rapid_reattach_defers_until_drained() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;
        // detach and re-attach within one tick
        manager
            .apply_delta(PortDelta {
                attached: vec![port("/dev/ttyA")],
                detached: vec![port("/dev/ttyA")],
            })
            .await;

        // never two live workers for the same id
        assert!(manager.device_count() <= 1);
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn shutdown_closes_every_sink_exactly_once() {
        let sink = RecordingSink::default();
        let mut manager = manager_with(sink.clone());

        manager
            .apply_delta(attach_delta(&["/dev/ttyA", "/dev/ttyB", "/dev/ttyC"]))
            .await;
        manager.shutdown_all().await;

        // one provider sink clone per worker, each closed once
        assert_eq!(*sink.closes.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn run_loop_exits_after_shutdown_signal() {
        let sink = RecordingSink::default();
        let mut manager =
            manager_with(sink.clone()).with_poll_interval(Duration::from_millis(20));

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        shutdown_tx.send(()).await.unwrap();

        // returns once shutdown_all has finished; no workers were attached
        manager.run(shutdown_rx).await;
        assert_eq!(manager.device_count(), 0);
    }

    #[tokio::test]
    async fn stopped_workers_report_terminal_state() {
        let mut manager = manager_with(RecordingSink::default());

        manager.apply_delta(attach_delta(&["/dev/ttyA"])).await;
        let handle = manager.registry.values().next().unwrap();
        assert_ne!(handle.state(), DeviceState::Stopped);

        manager.shutdown_all().await;
    }
}

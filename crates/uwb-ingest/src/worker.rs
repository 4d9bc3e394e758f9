//! Per-device ingest worker
//!
//! Each attached device gets one worker task that owns the serial
//! connection outright. The worker opens the port (retrying with bounded
//! backoff), then loops: read with a bounded timeout, frame, decode,
//! forward records to its sinks. A shutdown command is observed at every
//! loop iteration — during opening retries as well as active reads — so
//! cancellation latency is bounded by the read timeout or the current
//! backoff sleep, never by an indefinite blocking call.
//!
//! Nothing a worker hits at runtime escalates: decode failures discard
//! the line, read errors pause and continue, sink errors are logged and
//! ignored. A worker that can never open its port stays in `Opening`
//! until the manager stops it on detach.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use uwb_detect::{DeviceId, PortDescriptor};
use uwb_protocol::{decode, Decoded, LineFramer};

use crate::sink::RecordSink;

/// Serial baud rate used by EVB1000 devices
pub const BAUD_RATE: u32 = 115_200;

/// Bound on a single blocking read; also the shutdown-check cadence
const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Pause after a failed read so an unhealthy port cannot spin the loop
const READ_ERROR_PAUSE: Duration = Duration::from_millis(100);
/// First open-retry delay; doubles per attempt up to [`MAX_BACKOFF`]
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Cap on the open-retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Commands sent to a worker task
#[derive(Debug)]
pub enum WorkerCommand {
    /// Stop the worker: close the connection, close the sinks, exit
    Shutdown,
}

/// Observable worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Created, not yet running
    Idle,
    /// Trying to open the serial connection
    Opening,
    /// Connected and reading lines
    Active,
    /// Shutdown observed, releasing resources
    Stopping,
    /// Terminal; resources released
    Stopped,
}

/// Open-retry delay for a 1-based attempt number, doubling and capped
fn retry_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let delay = INITIAL_BACKOFF.saturating_mul(1u32 << shift);
    delay.min(MAX_BACKOFF)
}

/// One device's ingest worker
///
/// [`DeviceWorker::spawn`] runs it against the device's real serial
/// port; [`DeviceWorker::spawn_with_stream`] drives the same loop from
/// any byte stream (simulated devices, tests). Either way the returned
/// [`WorkerHandle`] is the only way to stop and observe the task.
pub struct DeviceWorker {
    id: DeviceId,
    port: PortDescriptor,
    sinks: Vec<Box<dyn RecordSink>>,
    state_tx: watch::Sender<DeviceState>,
    sinks_closed: bool,
}

/// Handle the manager keeps per spawned worker
pub struct WorkerHandle {
    id: DeviceId,
    port: PortDescriptor,
    cmd_tx: mpsc::Sender<WorkerCommand>,
    state_rx: watch::Receiver<DeviceState>,
    join: JoinHandle<()>,
}

impl DeviceWorker {
    fn new(
        id: DeviceId,
        port: PortDescriptor,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> (
        Self,
        mpsc::Receiver<WorkerCommand>,
        mpsc::Sender<WorkerCommand>,
        watch::Receiver<DeviceState>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(DeviceState::Idle);
        (
            Self {
                id,
                port,
                sinks,
                state_tx,
                sinks_closed: false,
            },
            cmd_rx,
            cmd_tx,
            state_rx,
        )
    }

    /// Spawn a worker task bound to the device's real serial port
    pub fn spawn(
        id: DeviceId,
        port: PortDescriptor,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> WorkerHandle {
        let (worker, cmd_rx, cmd_tx, state_rx) = Self::new(id, port.clone(), sinks);
        let join = tokio::spawn(worker.run(cmd_rx));
        WorkerHandle {
            id,
            port,
            cmd_tx,
            state_rx,
            join,
        }
    }

    /// Spawn a worker task fed by an arbitrary byte stream
    ///
    /// The opening phase is skipped; the worker starts `Active` on the
    /// given stream. Used by tests and simulated devices.
    pub fn spawn_with_stream<R>(
        id: DeviceId,
        port: PortDescriptor,
        stream: R,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> WorkerHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (worker, cmd_rx, cmd_tx, state_rx) = Self::new(id, port.clone(), sinks);
        let join = tokio::spawn(worker.run_with_stream(stream, cmd_rx));
        WorkerHandle {
            id,
            port,
            cmd_tx,
            state_rx,
            join,
        }
    }

    /// Task body for a real device: open with retry, then read until stopped
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<WorkerCommand>) {
        self.set_state(DeviceState::Opening);
        info!("worker {} opening {}", self.id, self.port);

        match self.open_with_retry(&mut cmd_rx).await {
            Some(stream) => {
                self.set_state(DeviceState::Active);
                info!("worker {} connected on {}", self.id, self.port.path);
                self.read_loop(stream, &mut cmd_rx).await;
            }
            // shutdown arrived before the port ever opened
            None => debug!("worker {} stopped while opening", self.id),
        }

        self.finish();
    }

    /// Task body for an externally supplied stream
    async fn run_with_stream<R>(mut self, stream: R, mut cmd_rx: mpsc::Receiver<WorkerCommand>)
    where
        R: AsyncRead + Unpin,
    {
        self.set_state(DeviceState::Active);
        self.read_loop(stream, &mut cmd_rx).await;
        self.finish();
    }

    /// Open the serial port, retrying with capped exponential backoff
    ///
    /// Returns `None` if a shutdown command arrives first.
    async fn open_with_retry(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<WorkerCommand>,
    ) -> Option<tokio_serial::SerialStream> {
        let mut attempt: u32 = 0;
        loop {
            // the device may enumerate before its port is ready to open
            match tokio_serial::new(&self.port.path, BAUD_RATE).open_native_async() {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    debug!(
                        "worker {} open attempt {} failed ({}), retrying in {:?}",
                        self.id, attempt, e, delay
                    );
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(WorkerCommand::Shutdown) | None => return None,
                        },
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Read lines until a shutdown command arrives
    async fn read_loop<R>(&mut self, mut stream: R, cmd_rx: &mut mpsc::Receiver<WorkerCommand>)
    where
        R: AsyncRead + Unpin,
    {
        let mut framer = LineFramer::new();
        let mut buffer = vec![0u8; 1024];

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(WorkerCommand::Shutdown) | None => {
                        debug!("worker {} shutdown requested", self.id);
                        break;
                    }
                },

                result = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buffer)) => {
                    match result {
                        Ok(Ok(n)) if n > 0 => {
                            framer.push_bytes(&buffer[..n]);
                            self.drain_lines(&mut framer);
                        }
                        Ok(Ok(_)) => {
                            // EOF; pause so a dead stream cannot spin the loop
                            tokio::time::sleep(READ_ERROR_PAUSE).await;
                        }
                        Ok(Err(e)) => {
                            warn!("worker {} read error: {}", self.id, e);
                            tokio::time::sleep(READ_ERROR_PAUSE).await;
                        }
                        Err(_) => {} // timeout; loop to re-check shutdown
                    }
                }
            }
        }
    }

    /// Decode every buffered line and forward records to the sinks
    fn drain_lines(&mut self, framer: &mut LineFramer) {
        while let Some(line) = framer.next_line() {
            if line.is_empty() {
                continue;
            }
            match decode(&line) {
                Ok(Decoded::Record(record)) => {
                    for sink in &mut self.sinks {
                        if let Err(e) = sink.record(&record) {
                            warn!("worker {} sink error: {}", self.id, e);
                        }
                    }
                }
                Ok(Decoded::Unrecognized) => {
                    trace!("worker {} unrecognized line", self.id);
                }
                Err(e) => {
                    debug!("worker {} discarding line: {}", self.id, e);
                }
            }
        }
    }

    /// Close sinks once and reach the terminal state
    fn finish(&mut self) {
        self.set_state(DeviceState::Stopping);
        self.close_sinks();
        self.set_state(DeviceState::Stopped);
        info!("worker {} stopped", self.id);
    }

    fn close_sinks(&mut self) {
        if self.sinks_closed {
            return;
        }
        self.sinks_closed = true;
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                warn!("worker {} sink close error: {}", self.id, e);
            }
        }
    }

    fn set_state(&self, state: DeviceState) {
        let _ = self.state_tx.send(state);
    }
}

impl WorkerHandle {
    /// Device this worker serves
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Port this worker is bound to
    pub fn port(&self) -> &PortDescriptor {
        &self.port
    }

    /// Latest observed lifecycle state
    pub fn state(&self) -> DeviceState {
        *self.state_rx.borrow()
    }

    /// Signal the worker to stop; does not wait for it
    pub fn signal_stop(&self) {
        // only Shutdown travels on this channel, so a full channel
        // already carries one
        let _ = self.cmd_tx.try_send(WorkerCommand::Shutdown);
    }

    /// Whether the worker task has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker task to exit
    pub async fn join(self) {
        let _ = self.join.await;
    }

    /// Signal stop and wait for the worker to exit
    pub async fn stop(self) {
        self.signal_stop();
        self.join().await;
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("port", &self.port.path)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::{FailingSink, RecordingSink};
    use tokio::io::AsyncWriteExt;

    fn descriptor() -> PortDescriptor {
        PortDescriptor {
            path: "/dev/ttyTEST0".to_string(),
            vid: 0x0403,
            pid: 0x6001,
        }
    }

    fn device_id() -> DeviceId {
        DeviceId::fingerprint(&descriptor())
    }

    #[test]
    fn backoff_is_bounded() {
        assert_eq!(retry_delay(1), Duration::from_millis(100));
        assert_eq!(retry_delay(2), Duration::from_millis(200));
        assert_eq!(retry_delay(3), Duration::from_millis(400));
        assert_eq!(retry_delay(5), Duration::from_millis(1600));
        assert_eq!(retry_delay(6), MAX_BACKOFF);
        assert_eq!(retry_delay(60), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn records_flow_to_sinks() {
        let sink = RecordingSink::default();
        let (mut client, server) = tokio::io::duplex(256);
        let handle = DeviceWorker::spawn_with_stream(
            device_id(),
            descriptor(),
            server,
            vec![Box::new(sink.clone())],
        );

        client
            .write_all(b"tpr 02 412570a4 412570a4 412570a4\r\n")
            .await
            .unwrap();
        client.write_all(b"garbage line\r\n").await.unwrap();
        client
            .write_all(b"trr 02 01 64 c8 12c 190\r\n")
            .await
            .unwrap();

        // let the worker drain before stopping it
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag().as_str(), "tpr");
        assert_eq!(records[1].tag().as_str(), "trr");
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_the_worker() {
        let good = RecordingSink::default();
        let (mut client, server) = tokio::io::duplex(256);
        let handle = DeviceWorker::spawn_with_stream(
            device_id(),
            descriptor(),
            server,
            vec![Box::new(FailingSink), Box::new(good.clone())],
        );

        client
            .write_all(b"trr 02 01 64 c8 12c 190\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_finished());
        assert_eq!(good.records.lock().unwrap().len(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn shutdown_reaches_stopped_exactly_once() {
        let sink = RecordingSink::default();
        let (_client, server) = tokio::io::duplex(64);
        let handle = DeviceWorker::spawn_with_stream(
            device_id(),
            descriptor(),
            server,
            vec![Box::new(sink.clone())],
        );

        handle.signal_stop();
        handle.join().await;
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn eof_keeps_worker_alive_until_stopped() {
        let sink = RecordingSink::default();
        let (client, server) = tokio::io::duplex(64);
        let handle = DeviceWorker::spawn_with_stream(
            device_id(),
            descriptor(),
            server,
            vec![Box::new(sink.clone())],
        );

        drop(client); // stream hits EOF immediately
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_finished());

        handle.stop().await;
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn opening_worker_stops_on_command() {
        // path that cannot be opened keeps the worker in Opening
        let handle = DeviceWorker::spawn(device_id(), descriptor(), Vec::new());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), DeviceState::Opening);
        assert!(!handle.is_finished());

        handle.stop().await;
    }
}

//! Record sink traits
//!
//! A device worker forwards every decoded record, synchronously, to each
//! of its sinks. Sinks are owned by the worker; the worker closes them
//! exactly once when it stops. A failing sink never takes the worker
//! down — errors are logged at the call boundary and ignored.

use uwb_detect::{DeviceId, PortDescriptor};
use uwb_protocol::DecodedRecord;

use crate::error::SinkError;

/// Consumer of decoded records
pub trait RecordSink: Send {
    /// Accept one decoded record
    fn record(&mut self, record: &DecodedRecord) -> Result<(), SinkError>;

    /// Flush and release all owned resources
    ///
    /// Called exactly once by the owning worker on stop; implementations
    /// must tolerate repeated calls.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Builds the sink stack for a newly attached device
///
/// The manager calls this once per spawned worker, so each worker owns
/// its sinks outright and can close them without coordination.
pub trait SinkProvider: Send + Sync {
    /// Sinks for the device identified by `id` on `port`
    fn sinks_for(&self, id: DeviceId, port: &PortDescriptor) -> Vec<Box<dyn RecordSink>>;
}

//! Error types for record sinks

use thiserror::Error;

/// Errors a record sink can report
///
/// Sink errors never cross a worker boundary: the worker logs them at the
/// call site and keeps running.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sink was asked to accept a record after close
    #[error("sink is closed")]
    Closed,
}

//! Error types for device detection

use std::path::PathBuf;

use thiserror::Error;

/// Fatal allow-list configuration errors
///
/// Any of these at startup means the process cannot know which devices to
/// accept and must exit with a diagnostic.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file does not exist or cannot be read
    #[error("configuration file {} not found or unreadable: {reason}", .path.display())]
    Missing { path: PathBuf, reason: String },

    /// First line is not the CONFIG_VID_PID marker or the column header is wrong
    #[error("malformed configuration header: expected '{expected}', got '{actual}'")]
    MalformedHeader {
        expected: &'static str,
        actual: String,
    },

    /// An entry row is not a pair of 4-character hex ids
    #[error("malformed configuration entry on line {line}: '{entry}'")]
    MalformedEntry { line: usize, entry: String },

    /// No (VID, PID) entries found
    #[error("no (VID, PID) entries found in configuration")]
    Empty,
}

/// Errors that can occur during port detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}

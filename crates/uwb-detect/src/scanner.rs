//! Serial port scanner
//!
//! Enumerates system serial ports and keeps only USB ports whose
//! (vid, pid) is allow-listed. The scanner has no protocol knowledge and
//! no memory; diffing against previous polls lives in
//! [`crate::watcher::PortWatcher`].

use serialport::{available_ports, SerialPortType};
use tracing::debug;

use crate::allowlist::AllowList;
use crate::error::DetectError;

/// Identity of a physical/virtual serial port, immutable once observed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    /// System path (e.g., /dev/ttyACM0, COM3)
    pub path: String,
    /// USB vendor id
    pub vid: u16,
    /// USB product id
    pub pid: u16,
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:04x}:{:04x})", self.path, self.vid, self.pid)
    }
}

/// Serial port scanner filtered by the USB allow-list
pub struct PortScanner {
    allowlist: AllowList,
}

impl PortScanner {
    /// Create a scanner accepting only allow-listed USB ids
    pub fn new(allowlist: AllowList) -> Self {
        Self { allowlist }
    }

    /// The allow-list this scanner filters with
    pub fn allowlist(&self) -> &AllowList {
        &self.allowlist
    }

    /// Enumerate currently present, allow-listed ports
    pub fn scan(&self) -> Result<Vec<PortDescriptor>, DetectError> {
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let result: Vec<_> = ports
            .into_iter()
            .filter_map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) if self.allowlist.contains(usb.vid, usb.pid) => {
                    Some(PortDescriptor {
                        path: p.port_name,
                        vid: usb.vid,
                        pid: usb.pid,
                    })
                }
                _ => None,
            })
            .collect();

        debug!("scan found {} allow-listed port(s)", result.len());
        Ok(result)
    }
}

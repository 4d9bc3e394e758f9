//! UWB Device Detection Library
//!
//! This crate discovers EVB1000 UWB devices as they are plugged and
//! unplugged. Devices expose USB virtual serial ports; an allow-list of
//! (vendor id, product id) pairs decides which ports belong to the
//! ranging system, and a polling watcher reports attach/detach deltas
//! against its previously known set.
//!
//! # Example
//!
//! ```rust,no_run
//! use uwb_detect::{AllowList, PortWatcher};
//!
//! let allowlist = AllowList::load("config.ini").unwrap();
//! let mut watcher = PortWatcher::new(allowlist);
//!
//! let delta = watcher.poll();
//! for port in &delta.attached {
//!     println!("new device on {}", port);
//! }
//! ```

pub mod allowlist;
pub mod error;
pub mod identity;
pub mod scanner;
pub mod watcher;

pub use allowlist::{AllowList, UsbId};
pub use error::{ConfigError, DetectError};
pub use identity::DeviceId;
pub use scanner::{PortDescriptor, PortScanner};
pub use watcher::{diff_ports, PortDelta, PortWatcher};

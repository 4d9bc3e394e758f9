//! EVB1000 UWB Telemetry Protocol Library
//!
//! This crate decodes the ASCII line protocol emitted by DecaWave EVB1000
//! ranging devices over their virtual serial ports. Each line is a
//! 3-character tag followed by space-delimited hex-encoded fields:
//!
//! - **tpr**: tag position report (trilaterated x/y/z)
//! - **apr**: anchor positions report (four anchor x/y/z triples)
//! - **arr**: anchor-to-anchor auto-ranging report
//! - **trr**: tag ranging report (ranges to four anchors)
//!
//! # Architecture
//!
//! [`LineFramer`] splits the raw serial byte stream into lines; [`decode`]
//! maps one line to a typed [`DecodedRecord`] (or reports it unrecognized /
//! malformed). Both are pure and hold no cross-device state, so every
//! device worker runs its own framer and calls the decoder concurrently.
//!
//! # Example
//!
//! ```rust
//! use uwb_protocol::{decode, Decoded, LineFramer, Value};
//!
//! let mut framer = LineFramer::new();
//! framer.push_bytes(b"tpr 02 412570a4 412570a4 412570a4\r\n");
//!
//! let line = framer.next_line().unwrap();
//! if let Decoded::Record(record) = decode(&line).unwrap() {
//!     assert_eq!(record.get("id"), Some(&Value::Unsigned(2)));
//! }
//! ```

pub mod decoder;
pub mod error;
pub mod framer;
pub mod record;

pub use decoder::{decode, Decoded};
pub use error::DecodeError;
pub use framer::LineFramer;
pub use record::{DecodedRecord, FieldType, MessageSpec, Tag, Value, TAG_FIELD};

//! USB allow-list configuration
//!
//! The collector only attaches to serial ports whose USB (vendor id,
//! product id) pair appears in a configuration file of the form:
//!
//! ```text
//! CONFIG_VID_PID
//! VID PID
//! 0403 6001
//! 10c4 ea60
//! ```
//!
//! The format is deliberately strict: a wrong marker, a wrong column
//! header, an id that is not exactly 4 hex characters, or a file with no
//! entries are all fatal startup errors.

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;

/// Marker expected on the first line
const HEADER_MARKER: &str = "CONFIG_VID_PID";
/// Column header expected on the second line
const COLUMN_HEADER: &str = "VID PID";

/// A USB (vendor id, product id) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl std::fmt::Display for UsbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Immutable set of acceptable USB ids, loaded once at startup
#[derive(Debug, Clone)]
pub struct AllowList {
    ids: HashSet<UsbId>,
}

impl AllowList {
    /// Load the allow-list from a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Missing {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_str(&text)
    }

    /// Parse allow-list text
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let mut lines = text.lines().enumerate();

        let marker = lines.next().map(|(_, l)| l.trim()).unwrap_or("");
        if marker != HEADER_MARKER {
            return Err(ConfigError::MalformedHeader {
                expected: HEADER_MARKER,
                actual: marker.to_string(),
            });
        }

        let header = lines.next().map(|(_, l)| l.trim()).unwrap_or("");
        if header.split_ascii_whitespace().collect::<Vec<_>>()
            != COLUMN_HEADER.split(' ').collect::<Vec<_>>()
        {
            return Err(ConfigError::MalformedHeader {
                expected: COLUMN_HEADER,
                actual: header.to_string(),
            });
        }

        let mut ids = HashSet::new();
        for (index, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            ids.insert(parse_entry(index + 1, line)?);
        }

        if ids.is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(Self { ids })
    }

    /// Whether the given USB id pair is acceptable
    pub fn contains(&self, vid: u16, pid: u16) -> bool {
        self.ids.contains(&UsbId::new(vid, pid))
    }

    /// Number of configured pairs
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over the configured pairs
    pub fn iter(&self) -> impl Iterator<Item = &UsbId> {
        self.ids.iter()
    }
}

fn parse_entry(line_no: usize, line: &str) -> Result<UsbId, ConfigError> {
    let malformed = || ConfigError::MalformedEntry {
        line: line_no,
        entry: line.to_string(),
    };

    let mut tokens = line.split_ascii_whitespace();
    let vid = tokens.next().ok_or_else(malformed)?;
    let pid = tokens.next().ok_or_else(malformed)?;
    if tokens.next().is_some() {
        return Err(malformed());
    }

    Ok(UsbId::new(
        parse_id(vid).ok_or_else(malformed)?,
        parse_id(pid).ok_or_else(malformed)?,
    ))
}

/// An id is exactly 4 hex characters
fn parse_id(token: &str) -> Option<u16> {
    if token.len() != 4 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(token, 16).ok()
}

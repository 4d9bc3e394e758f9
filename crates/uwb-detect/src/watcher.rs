//! Hot-plug port watcher
//!
//! Polls the scanner and diffs the result against the previously known
//! port set, yielding attach/detach deltas. Enumeration failures are a
//! no-op poll: they log a warning, leave the known set untouched, and
//! never propagate.

use std::collections::HashSet;

use tracing::warn;

use crate::allowlist::AllowList;
use crate::scanner::{PortDescriptor, PortScanner};

/// Result of one watcher poll
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PortDelta {
    /// Allow-listed ports that appeared since the last poll
    pub attached: Vec<PortDescriptor>,
    /// Previously known ports that are now gone
    pub detached: Vec<PortDescriptor>,
}

impl PortDelta {
    /// True when nothing changed
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Pure set-difference between the known set and a fresh scan
///
/// No ordering guarantee among multiple simultaneous attach/detach
/// entries.
pub fn diff_ports(known: &HashSet<PortDescriptor>, current: &[PortDescriptor]) -> PortDelta {
    let current_set: HashSet<&PortDescriptor> = current.iter().collect();

    PortDelta {
        attached: current
            .iter()
            .filter(|p| !known.contains(*p))
            .cloned()
            .collect(),
        detached: known
            .iter()
            .filter(|p| !current_set.contains(*p))
            .cloned()
            .collect(),
    }
}

/// Watches for allow-listed ports appearing and disappearing
pub struct PortWatcher {
    scanner: PortScanner,
    known: HashSet<PortDescriptor>,
}

impl PortWatcher {
    /// Create a watcher with an empty known set
    pub fn new(allowlist: AllowList) -> Self {
        Self {
            scanner: PortScanner::new(allowlist),
            known: HashSet::new(),
        }
    }

    /// Poll the system for attach/detach changes
    pub fn poll(&mut self) -> PortDelta {
        match self.scanner.scan() {
            Ok(current) => self.apply_scan(current),
            Err(e) => {
                warn!("port enumeration failed, skipping poll: {}", e);
                PortDelta::default()
            }
        }
    }

    /// Ports currently considered present
    pub fn known(&self) -> &HashSet<PortDescriptor> {
        &self.known
    }

    /// Diff a scan result against the known set and adopt it
    ///
    /// Split from [`poll`](Self::poll) so the known-set semantics are
    /// testable without any hardware.
    fn apply_scan(&mut self, current: Vec<PortDescriptor>) -> PortDelta {
        let delta = diff_ports(&self.known, &current);
        self.known = current.into_iter().collect();
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::AllowList;

    fn port(path: &str) -> PortDescriptor {
        PortDescriptor {
            path: path.to_string(),
            vid: 0x0403,
            pid: 0x6001,
        }
    }

    fn watcher() -> PortWatcher {
        let allowlist = AllowList::from_str("CONFIG_VID_PID\nVID PID\n0403 6001\n").unwrap();
        PortWatcher::new(allowlist)
    }

    #[test]
    fn first_poll_attaches_everything() {
        let mut w = watcher();
        let delta = w.apply_scan(vec![port("/dev/ttyACM0"), port("/dev/ttyACM1")]);

        assert_eq!(delta.attached.len(), 2);
        assert!(delta.detached.is_empty());
        assert_eq!(w.known().len(), 2);
    }

    #[test]
    fn known_a_b_scan_b_c_yields_attach_c_detach_a() {
        let (a, b, c) = (port("/dev/A"), port("/dev/B"), port("/dev/C"));
        let mut w = watcher();
        w.apply_scan(vec![a.clone(), b.clone()]);

        let delta = w.apply_scan(vec![b.clone(), c.clone()]);

        assert_eq!(delta.attached, vec![c.clone()]);
        assert_eq!(delta.detached, vec![a]);
        let known: HashSet<_> = [b, c].into_iter().collect();
        assert_eq!(*w.known(), known);
    }

    #[test]
    fn unchanged_scan_is_empty_delta() {
        let mut w = watcher();
        w.apply_scan(vec![port("/dev/A")]);
        assert!(w.apply_scan(vec![port("/dev/A")]).is_empty());
    }

    #[test]
    fn diff_is_pure() {
        let known: HashSet<_> = [port("/dev/A")].into_iter().collect();
        let current = vec![port("/dev/B")];

        let d1 = diff_ports(&known, &current);
        let d2 = diff_ports(&known, &current);
        assert_eq!(d1, d2);
        assert_eq!(known.len(), 1); // untouched
    }

    #[test]
    fn same_path_different_product_is_reattach() {
        let before = port("/dev/A");
        let mut after = port("/dev/A");
        after.pid = 0x6002;

        let known: HashSet<_> = [before.clone()].into_iter().collect();
        let delta = diff_ports(&known, &[after.clone()]);

        assert_eq!(delta.attached, vec![after]);
        assert_eq!(delta.detached, vec![before]);
    }
}

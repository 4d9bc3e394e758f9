//! Progress metering sink
//!
//! Keeps one meter per (tag, reporting device id), lazily created on the
//! first matching record, counting records and their arrival rate. The
//! registry is shared across workers; each worker gets its own
//! [`ProgressSink`] adapter. Meters render through `tracing` on a
//! throttled cadence so a fast device cannot flood the log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::info;

use uwb_protocol::{DecodedRecord, Tag};

use crate::error::SinkError;
use crate::sink::RecordSink;

/// Minimum time between rendered updates for one meter
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// One per-(tag, device) counter
#[derive(Debug)]
struct Meter {
    description: String,
    count: u64,
    started: Instant,
    last_report: Instant,
}

/// Meter description in the style of the operator display
fn describe(tag: Tag, device_id: u64) -> String {
    let prefix = match tag {
        Tag::Arr => "(autorng) anchor",
        Tag::Tpr => "(trilat) tag",
        Tag::Trr => "(ranging) tag",
        Tag::Apr => "(anchor pos) tag",
    };
    format!("{} {}", prefix, device_id)
}

/// Shared registry of progress meters
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    inner: Arc<Mutex<HashMap<(Tag, u64), Meter>>>,
}

impl ProgressRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sink adapter feeding this registry
    pub fn sink(&self) -> ProgressSink {
        ProgressSink {
            registry: self.clone(),
        }
    }

    /// Total records counted for a (tag, device id) meter
    pub fn count(&self, tag: Tag, device_id: u64) -> u64 {
        self.lock()
            .get(&(tag, device_id))
            .map(|m| m.count)
            .unwrap_or(0)
    }

    /// Number of live meters
    pub fn meter_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(Tag, u64), Meter>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // a panicked worker only leaves counters behind, keep going
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn update(&self, record: &DecodedRecord) {
        let key = (record.tag(), record.device_id());
        let now = Instant::now();
        let mut meters = self.lock();

        let meter = meters.entry(key).or_insert_with(|| Meter {
            description: describe(key.0, key.1),
            count: 0,
            started: now,
            // back-dated so the first record renders immediately
            last_report: now.checked_sub(REPORT_INTERVAL).unwrap_or(now),
        });

        meter.count += 1;
        if now.duration_since(meter.last_report) >= REPORT_INTERVAL {
            let elapsed = now.duration_since(meter.started).as_secs_f64();
            let rate = if elapsed > 0.0 {
                meter.count as f64 / elapsed
            } else {
                0.0
            };
            info!(
                "{}: {} msg ({:.1} msg/s)",
                meter.description, meter.count, rate
            );
            meter.last_report = now;
        }
    }
}

/// Per-worker adapter feeding the shared registry
pub struct ProgressSink {
    registry: ProgressRegistry,
}

impl RecordSink for ProgressSink {
    fn record(&mut self, record: &DecodedRecord) -> Result<(), SinkError> {
        self.registry.update(record);
        Ok(())
    }

    // meters outlive their worker; nothing to release
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

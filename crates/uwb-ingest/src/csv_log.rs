//! CSV logging sink
//!
//! Writes decoded records to per-tag CSV files. Files open lazily on the
//! first record of their tag and stay open until the owning worker stops;
//! the header row is written once per open. Position-style reports log to
//! date-stamped files; auto-ranging reports keep the flat
//! `a2a_anch_<id>.csv` name expected by the downstream MATLAB collection
//! tooling.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use tracing::debug;

use uwb_protocol::{DecodedRecord, Tag};

use crate::error::SinkError;
use crate::sink::RecordSink;

/// Tags that get logged; everything else is dropped silently
const LOGGABLE_TAGS: &[Tag] = &[Tag::Tpr, Tag::Apr, Tag::Arr, Tag::Trr];

/// Per-device CSV logger
pub struct CsvLogger {
    dir: PathBuf,
    writers: HashMap<Tag, BufWriter<File>>,
    closed: bool,
}

impl CsvLogger {
    /// Create a logger writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: HashMap::new(),
            closed: false,
        }
    }

    /// File name for a tag and the reporting device's in-message id
    fn file_name(tag: Tag, device_id: u64) -> String {
        match tag {
            Tag::Tpr | Tag::Apr | Tag::Trr => {
                let date = chrono::Local::now().format("%d_%m_%Y");
                format!("tag_{}_{}_{}.csv", device_id, date, tag)
            }
            Tag::Arr => format!("a2a_anch_{}.csv", device_id),
        }
    }

    /// Open (or create) the file for `record`'s tag and write the header
    fn open_writer(&mut self, record: &DecodedRecord) -> Result<&mut BufWriter<File>, SinkError> {
        match self.writers.entry(record.tag()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self
                    .dir
                    .join(Self::file_name(record.tag(), record.device_id()));
                debug!("opening log file {}", path.display());

                // append so a reconnecting device with the same id keeps
                // logging into the same file
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                let mut writer = BufWriter::new(file);

                let header: Vec<&str> = record.fields().iter().map(|(name, _)| *name).collect();
                writeln!(writer, "{}", header.join(","))?;

                Ok(entry.insert(writer))
            }
        }
    }
}

impl RecordSink for CsvLogger {
    fn record(&mut self, record: &DecodedRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if !LOGGABLE_TAGS.contains(&record.tag()) {
            return Ok(());
        }

        let writer = self.open_writer(record)?;
        let row: Vec<String> = record
            .fields()
            .iter()
            .map(|(_, value)| value.to_string())
            .collect();
        writeln!(writer, "{}", row.join(","))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        for (tag, mut writer) in self.writers.drain() {
            if let Err(e) = writer.flush() {
                debug!("flush failed for {} log: {}", tag, e);
                result = Err(SinkError::Io(e));
            }
        }
        result
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        // last-resort flush; the owning worker normally closes explicitly
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uwb_protocol::{decode, Decoded};

    fn record(line: &[u8]) -> DecodedRecord {
        match decode(line).unwrap() {
            Decoded::Record(record) => record,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CsvLogger::new(dir.path());

        logger
            .record(&record(b"trr 02 01 64 c8 12c 190"))
            .unwrap();
        logger
            .record(&record(b"trr 02 02 65 c9 12d 191"))
            .unwrap();
        logger.close().unwrap();

        let date = chrono::Local::now().format("%d_%m_%Y");
        let path = dir.path().join(format!("tag_2_{}_trr.csv", date));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "msg_type,id,range_num,r0,r1,r2,r3");
        assert_eq!(lines[1], "trr,2,1,100,200,300,400");
        assert_eq!(lines[2], "trr,2,2,101,201,301,401");
    }

    #[test]
    fn arr_uses_anchor_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CsvLogger::new(dir.path());

        logger
            .record(&record(b"arr 03 01 02 04 412570a4 R"))
            .unwrap();
        logger.close().unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("a2a_anch_3.csv")).unwrap();
        assert!(content.starts_with("msg_type,id,master_id,src_id,dest_id,range,flag\n"));
        assert!(content.contains("arr,3,1,2,4,10.34,R"));
    }

    #[test]
    fn one_file_per_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CsvLogger::new(dir.path());

        logger
            .record(&record(b"tpr 02 412570a4 412570a4 412570a4"))
            .unwrap();
        logger
            .record(&record(b"trr 02 01 64 c8 12c 190"))
            .unwrap();
        logger.close().unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CsvLogger::new(dir.path());

        logger
            .record(&record(b"trr 02 01 64 c8 12c 190"))
            .unwrap();
        logger.close().unwrap();
        logger.close().unwrap();

        assert!(matches!(
            logger.record(&record(b"trr 02 01 64 c8 12c 190")),
            Err(SinkError::Closed)
        ));
    }
}

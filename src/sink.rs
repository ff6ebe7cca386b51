//! Append-only CSV sink for enriched records.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CollectorError, Result};
use crate::models::EnrichedRecord;

/// Destination for enriched records. The pipeline commits one record per
/// call so a failed append never loses more than that record.
pub trait RecordSink {
    fn append(&mut self, record: &EnrichedRecord) -> Result<()>;
}

/// CSV file sink. The header row is written once, on the first append to a
/// new or empty file; every append is buffered whole and flushed before
/// returning, so the file never contains a partial row.
pub struct CsvSink {
    file: File,
    path: PathBuf,
    wrote_header: bool,
}

impl CsvSink {
    /// Open (or create) the sink file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CollectorError::SinkWrite(format!("{}: {e}", parent.display())))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CollectorError::SinkWrite(format!("{}: {e}", path.display())))?;

        let len = file
            .metadata()
            .map_err(|e| CollectorError::SinkWrite(e.to_string()))?
            .len();

        info!(path = %path.display(), existing_bytes = len, "opened sink");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            wrote_header: len > 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: &EnrichedRecord) -> Result<()> {
        // Serialize the full row (plus header on first use) into memory so
        // the file write is all-or-nothing.
        let mut buf = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(!self.wrote_header)
                .from_writer(&mut buf);
            writer
                .serialize(record)
                .map_err(|e| CollectorError::SinkWrite(e.to_string()))?;
            writer
                .flush()
                .map_err(|e| CollectorError::SinkWrite(e.to_string()))?;
        }

        self.file
            .write_all(&buf)
            .map_err(|e| CollectorError::SinkWrite(format!("{}: {e}", self.path.display())))?;
        self.file
            .flush()
            .map_err(|e| CollectorError::SinkWrite(format!("{}: {e}", self.path.display())))?;

        self.wrote_header = true;

        Ok(())
    }
}

//! Session detection log (JSON Lines).
//!
//! Each pipeline session writes its own `detections_<unix-seconds>.jsonl` file
//! (`detections_<unix-seconds>_<n>.jsonl` when a session already started in the same
//! second); every consumed result appends one `LogRecord` line. Lines are flushed as they are
//! written, so a crash loses at most the record being written.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use super::{unix_millis, LogRecord, RecordLog};

const MAX_SESSION_SUFFIX: u32 = 1000;

pub struct JsonlRecordLog {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
}

impl JsonlRecordLog {
    /// Create a fresh session log inside `dir` (created if missing).
    pub fn create_session(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let secs = unix_millis() / 1000;
        for attempt in 0..MAX_SESSION_SUFFIX {
            let name = match attempt {
                0 => format!("detections_{}.jsonl", secs),
                n => format!("detections_{}_{}.jsonl", secs, n),
            };
            let path = dir.join(name);
            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create {}", path.display()))
                }
            };
            log::info!("detection log: writing to {}", path.display());
            return Ok(Self::from_file(path, file));
        }
        bail!(
            "no free session log name for second {} in {}",
            secs,
            dir.display()
        )
    }

    /// Open `path` for appending.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self::from_file(path.to_path_buf(), file))
    }

    fn from_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }
}

impl RecordLog for JsonlRecordLog {
    fn append(&mut self, record: &LogRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read every record of a session log. Blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>> {
    let file =
        File::open(path).with_context(|| format!("failed to open log {}", path.display()))?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| anyhow!("invalid record on line {}: {}", index + 1, e))?;
        records.push(record);
    }
    Ok(records)
}

//! # Atomic Record Writer
//!
//! Append-only, crash-safe writer for the line-delimited result log.
//!
//! Every record is serialized in memory together with its trailing separator and
//! handed to the OS in a single write, then flushed and synced before `append`
//! returns. A record is therefore either a complete line on disk or absent; two
//! records can never collapse onto one line.
//!
//! A crash mid-write can leave a torn final line. [`AtomicRecordWriter::open`]
//! truncates such a fragment before the first append, since it was never
//! acknowledged to any caller.

use super::ensure_parent_dir;
use crate::constants::RECORD_SEPARATOR;
use crate::error::WriteError;
use crate::models::ResultRecord;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TAIL_SCAN_CHUNK: u64 = 8 * 1024;

struct WriterState {
    file: File,
    /// Length of the file after the last acknowledged append
    len: u64,
    appended: u64,
}

/// Single-writer handle on the result log
pub struct AtomicRecordWriter {
    path: PathBuf,
    state: Mutex<WriterState>,
}

impl std::fmt::Debug for AtomicRecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicRecordWriter")
            .field("path", &self.path)
            .finish()
    }
}

impl AtomicRecordWriter {
    /// Open (or create) the log at `path`, repairing a torn final line
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let path = path.into();
        ensure_parent_dir(&path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| WriteError::Open {
                path: path.clone(),
                source,
            })?;

        let dropped = repair_torn_tail(&mut file).map_err(|e| WriteError::io(&path, e))?;
        if dropped > 0 {
            warn!(
                path = %path.display(),
                dropped_bytes = dropped,
                "Truncated unacknowledged partial line at end of record log"
            );
        }

        let len = file
            .metadata()
            .map_err(|e| WriteError::io(&path, e))?
            .len();

        debug!(path = %path.display(), len, "Record log opened");

        Ok(Self {
            path,
            state: Mutex::new(WriterState {
                file,
                len,
                appended: 0,
            }),
        })
    }

    /// Append one record as a complete, synced line
    pub fn append(&self, record: &ResultRecord) -> Result<(), WriteError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(RECORD_SEPARATOR);

        let mut state = self.state.lock();
        let before = state.len;

        let written = state
            .file
            .write_all(&line)
            .and_then(|()| state.file.flush())
            .and_then(|()| state.file.sync_data());

        match written {
            Ok(()) => {
                state.len = before + line.len() as u64;
                state.appended += 1;
                Ok(())
            }
            Err(source) => {
                // Roll back whatever part of the line reached the file.
                if let Err(rollback) = state.file.set_len(before) {
                    warn!(
                        path = %self.path.display(),
                        error = %rollback,
                        "Failed to roll back partial append"
                    );
                }
                Err(WriteError::io(&self.path, source))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle
    pub fn appended(&self) -> u64 {
        self.state.lock().appended
    }
}

/// Truncate the file back to its last separator; returns the number of bytes dropped
fn repair_torn_tail(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == RECORD_SEPARATOR {
        return Ok(0);
    }

    let mut end = len;
    let mut keep = 0u64;
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|b| *b == RECORD_SEPARATOR) {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    file.set_len(keep)?;
    file.sync_all()?;
    Ok(len - keep)
}

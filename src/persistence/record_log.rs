//! Read side of the result log.
//!
//! Scans tolerate a log that is still growing: only separator-terminated lines are
//! considered, and a trailing fragment is reported as a torn tail rather than as
//! corruption.

use crate::constants::RECORD_SEPARATOR;
use crate::models::{ResultRecord, ResultStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// One parsed line of the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// 1-based line number
    pub line: usize,
    pub work_item_index: u64,
    pub status: ResultStatus,
}

/// Position reconstructed from log contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuiltPosition {
    pub resume_index: u64,
    pub processed_count: u64,
    pub failed_count: u64,
}

/// Summary of a full log scan
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    pub entries: Vec<LogEntry>,
    /// Line numbers of complete lines that failed to parse
    pub corrupt_lines: Vec<usize>,
    /// The file ends in a fragment without a separator
    pub torn_tail: bool,
}

impl LogScan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.corrupt_lines.is_empty()
    }

    pub fn first_corrupt_line(&self) -> Option<usize> {
        self.corrupt_lines.first().copied()
    }

    pub fn success_indices(&self) -> BTreeSet<u64> {
        self.entries
            .iter()
            .filter(|e| e.status == ResultStatus::Success)
            .map(|e| e.work_item_index)
            .collect()
    }

    /// Status per recorded index; a `Success` outranks any earlier failure
    pub fn recorded_outcomes(&self) -> BTreeMap<u64, ResultStatus> {
        collapse(self.entries.iter())
    }

    /// Indices that carry more than one `Success` record
    pub fn duplicate_successes(&self) -> Vec<u64> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for entry in self.entries.iter().filter(|e| e.status == ResultStatus::Success) {
            if !seen.insert(entry.work_item_index) {
                duplicates.insert(entry.work_item_index);
            }
        }
        duplicates.into_iter().collect()
    }

    /// Position implied by every parsed entry
    pub fn rebuild_position(&self) -> RebuiltPosition {
        rebuild(self.entries.iter())
    }

    /// Position implied by entries preceding the first corrupt line
    pub fn rebuild_clean_prefix(&self) -> RebuiltPosition {
        match self.first_corrupt_line() {
            Some(boundary) => rebuild(self.entries.iter().filter(|e| e.line < boundary)),
            None => self.rebuild_position(),
        }
    }

    pub fn clean_prefix_len(&self) -> usize {
        match self.first_corrupt_line() {
            Some(boundary) => self.entries.iter().filter(|e| e.line < boundary).count(),
            None => self.entries.len(),
        }
    }
}

fn collapse<'a>(entries: impl Iterator<Item = &'a LogEntry>) -> BTreeMap<u64, ResultStatus> {
    let mut outcome: BTreeMap<u64, ResultStatus> = BTreeMap::new();
    for entry in entries {
        outcome
            .entry(entry.work_item_index)
            .and_modify(|status| {
                if entry.status == ResultStatus::Success {
                    *status = ResultStatus::Success;
                }
            })
            .or_insert(entry.status);
    }
    outcome
}

/// Resume index is one past the highest index reachable from 0 without a gap.
fn rebuild<'a>(entries: impl Iterator<Item = &'a LogEntry>) -> RebuiltPosition {
    let outcome = collapse(entries);

    let mut resume_index = 0u64;
    let mut failed_count = 0u64;
    while let Some(status) = outcome.get(&resume_index) {
        if *status == ResultStatus::Failed {
            failed_count += 1;
        }
        resume_index += 1;
    }

    RebuiltPosition {
        resume_index,
        processed_count: resume_index,
        failed_count,
    }
}

/// Line-oriented reader over a result log
pub struct RecordLogReader;

impl RecordLogReader {
    /// Scan the log at `path`; a missing file scans as empty
    pub fn scan(path: &Path) -> io::Result<LogScan> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LogScan::default()),
            Err(e) => return Err(e),
        };

        let mut reader = BufReader::new(file);
        let mut scan = LogScan::default();
        let mut buf = Vec::new();
        let mut line = 0usize;

        loop {
            buf.clear();
            let read = reader.read_until(RECORD_SEPARATOR, &mut buf)?;
            if read == 0 {
                break;
            }
            line += 1;

            if buf.last() != Some(&RECORD_SEPARATOR) {
                scan.torn_tail = true;
                break;
            }
            buf.pop();

            match serde_json::from_slice::<ResultRecord>(&buf) {
                Ok(record) => scan.entries.push(LogEntry {
                    line,
                    work_item_index: record.work_item_index,
                    status: record.status,
                }),
                Err(_) => scan.corrupt_lines.push(line),
            }
        }

        debug!(
            path = %path.display(),
            entries = scan.entries.len(),
            corrupt = scan.corrupt_lines.len(),
            torn_tail = scan.torn_tail,
            "Scanned record log"
        );
        Ok(scan)
    }

    /// Read every parseable record, skipping corrupt lines and a torn tail
    pub fn read_records(path: &Path) -> io::Result<Vec<ResultRecord>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut records = Vec::new();
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(RECORD_SEPARATOR, &mut buf)? == 0 {
                break;
            }
            if buf.pop() != Some(RECORD_SEPARATOR) {
                break;
            }
            if let Ok(record) = serde_json::from_slice::<ResultRecord>(&buf) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

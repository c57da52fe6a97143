//! Built-in [`WorkSource`] implementations.

use super::traits::WorkSource;
use crate::models::WorkItem;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Source over payloads held in memory; item indices are vector positions
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    payloads: Vec<Value>,
    position: usize,
}

impl InMemorySource {
    pub fn new(payloads: Vec<Value>) -> Self {
        Self {
            payloads,
            position: 0,
        }
    }
}

impl WorkSource for InMemorySource {
    fn next_item(&mut self) -> io::Result<Option<WorkItem>> {
        let item = self
            .payloads
            .get(self.position)
            .map(|payload| WorkItem::new(self.position as u64, payload.clone()));
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.payloads.len() as u64)
    }

    fn skip_to(&mut self, index: u64) -> io::Result<()> {
        let index = usize::try_from(index).unwrap_or(usize::MAX);
        self.position = self.position.max(index.min(self.payloads.len()));
        Ok(())
    }
}

/// Source reading one payload per line of a file.
///
/// Line `n` (0-based) is item `n`. Lines holding valid JSON become that JSON value;
/// anything else is passed through as a string, and blank lines become empty
/// payloads so indices stay aligned with line numbers.
pub struct JsonLinesSource {
    reader: Box<dyn BufRead + Send>,
    next_index: u64,
    total: Option<u64>,
}

impl std::fmt::Debug for JsonLinesSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSource")
            .field("next_index", &self.next_index)
            .field("total", &self.total)
            .finish()
    }
}

impl JsonLinesSource {
    /// Open `path`, counting its lines first so progress can report a percentage
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let total = BufReader::new(File::open(path)?).lines().try_fold(0u64, |n, line| {
            line.map(|_| n + 1)
        })?;
        Ok(Self {
            reader: Box::new(BufReader::new(File::open(path)?)),
            next_index: 0,
            total: Some(total),
        })
    }

    /// Wrap any buffered reader; the total is unknown
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            next_index: 0,
            total: None,
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

impl WorkSource for JsonLinesSource {
    fn next_item(&mut self) -> io::Result<Option<WorkItem>> {
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };

        let payload = if line.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&line).unwrap_or(Value::String(line))
        };

        let item = WorkItem::new(self.next_index, payload);
        self.next_index += 1;
        Ok(Some(item))
    }

    fn size_hint(&self) -> Option<u64> {
        self.total
    }

    fn skip_to(&mut self, index: u64) -> io::Result<()> {
        while self.next_index < index {
            if self.read_line()?.is_none() {
                break;
            }
            self.next_index += 1;
        }
        Ok(())
    }
}

//! # Durable Persistence
//!
//! Single-writer file persistence for the three artifacts of a run:
//!
//! - [`AtomicRecordWriter`] appends whole lines to the result log
//! - [`CheckpointStore`] replaces the checkpoint via temp-write-then-rename
//! - [`ProgressTracker`] replaces the progress side file on every outcome
//!
//! Readers of any of these files never take locks. They rely on whole-line
//! atomicity (log) or atomic rename (checkpoint, progress) instead.

pub mod checkpoint_store;
pub mod progress_tracker;
pub mod record_log;
pub mod record_writer;

pub use checkpoint_store::CheckpointStore;
pub use progress_tracker::ProgressTracker;
pub use record_log::{LogScan, RecordLogReader};
pub use record_writer::AtomicRecordWriter;

use crate::constants::TEMP_SUFFIX;
use crate::error::WriteError;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace `path` with `bytes` so that readers observe either the old or the new
/// content, never a partial file.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    ensure_parent_dir(path)?;
    let temp_path = temp_path_for(path);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|source| WriteError::Open {
            path: temp_path.clone(),
            source,
        })?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .and_then(|()| file.sync_all())
        .map_err(|e| WriteError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| WriteError::io(path, e))?;
    sync_parent_dir(path)
}

pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{TEMP_SUFFIX}"));
    path.with_file_name(name)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), WriteError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Persist a rename by syncing the containing directory
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> Result<(), WriteError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| WriteError::io(parent, e))
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> Result<(), WriteError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomically_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_temp_path_sits_next_to_target() {
        let path = Path::new("/data/run/checkpoint.json");
        assert_eq!(
            temp_path_for(path),
            PathBuf::from("/data/run/checkpoint.json.tmp")
        );
    }
}

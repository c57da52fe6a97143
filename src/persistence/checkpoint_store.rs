//! # Checkpoint Store
//!
//! Durable, schema-validated resume point.
//!
//! `save` refuses anything that fails the schema and replaces the canonical file via
//! temp-write-then-rename, so the file on disk is always absent or fully valid. The
//! previous version is kept as a timestamped backup
//! (`checkpoint.json.bak.<stamp>`) up to the configured retention.
//!
//! `load` never fails on a bad checkpoint by itself. An unreadable, invalid, or
//! missing-while-results-exist checkpoint goes through the [`RecoveryChain`], and
//! only total recovery failure surfaces as [`CheckpointError::Unrecoverable`].

use super::record_log::RecordLogReader;
use super::{sync_parent_dir, write_atomically};
use crate::constants::BACKUP_INFIX;
use crate::error::{CheckpointError, WriteError};
use crate::logging::log_checkpoint_operation;
use crate::models::Checkpoint;
use crate::recovery::strategies::{RecoveryChain, RecoveryContext};
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    record_log_path: PathBuf,
    backup_retention: usize,
    recovery: RecoveryChain,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, record_log_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            record_log_path: record_log_path.into(),
            backup_retention: 0,
            recovery: RecoveryChain::standard(),
        }
    }

    /// Keep up to `count` previous versions as backups
    pub fn with_backup_retention(mut self, count: usize) -> Self {
        self.backup_retention = count;
        self
    }

    pub fn with_recovery_chain(mut self, recovery: RecoveryChain) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate and atomically replace the checkpoint
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        checkpoint
            .validate()
            .map_err(|reason| CheckpointError::Schema { reason })?;

        if self.backup_retention > 0 {
            if let Err(e) = self.rotate_backup() {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to back up previous checkpoint, continuing with save"
                );
            }
        }

        self.commit(checkpoint)?;
        log_checkpoint_operation("save", Some(checkpoint.resume_index), "ok", None);
        Ok(())
    }

    /// Load the checkpoint, recovering it when it is unusable.
    ///
    /// Returns `None` only on a genuine first run: no checkpoint and no results.
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let scan = RecordLogReader::scan(&self.record_log_path).map_err(|source| {
                    CheckpointError::Read {
                        path: self.record_log_path.clone(),
                        source,
                    }
                })?;
                if scan.is_empty() {
                    debug!(path = %self.path.display(), "No checkpoint, starting fresh");
                    return Ok(None);
                }
                let cause = format!(
                    "checkpoint missing while result log holds {} record(s)",
                    scan.entries.len() + scan.corrupt_lines.len()
                );
                return self.recover(cause).map(Some);
            }
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let parsed = serde_json::from_slice::<serde_json::Value>(&bytes)
            .map_err(|e| format!("unparseable checkpoint: {e}"))
            .and_then(|document| {
                Checkpoint::from_document(document)
                    .map_err(|reason| format!("checkpoint violates schema: {reason}"))
            });

        match parsed {
            Ok(checkpoint) => {
                log_checkpoint_operation("load", Some(checkpoint.resume_index), "ok", None);
                Ok(Some(checkpoint))
            }
            Err(cause) => {
                warn!(path = %self.path.display(), %cause, "Checkpoint unusable, starting recovery");
                self.recover(cause).map(Some)
            }
        }
    }

    /// Newest backup that still passes the schema
    pub fn latest_backup(&self) -> Option<Checkpoint> {
        self.backup_paths()
            .into_iter()
            .rev()
            .find_map(|path| {
                let bytes = fs::read(&path).ok()?;
                let document = serde_json::from_slice(&bytes).ok()?;
                Checkpoint::from_document(document).ok()
            })
    }

    fn recover(&self, cause: String) -> Result<Checkpoint, CheckpointError> {
        let context = RecoveryContext {
            record_log_path: &self.record_log_path,
            checkpoint_path: &self.path,
            latest_backup: self.latest_backup(),
            cause,
        };

        match self.recovery.recover(&context) {
            Ok(outcome) => {
                // The unusable file is replaced directly; it must not enter the backup rotation.
                self.commit(&outcome.checkpoint)?;
                log_checkpoint_operation(
                    "recover",
                    Some(outcome.checkpoint.resume_index),
                    "recovered",
                    Some(outcome.strategy),
                );
                Ok(outcome.checkpoint)
            }
            Err(e) => {
                log_checkpoint_operation("recover", None, "unrecoverable", Some(&e.to_string()));
                Err(CheckpointError::Unrecoverable(e))
            }
        }
    }

    fn commit(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(WriteError::from)?;
        write_atomically(&self.path, &bytes)?;
        Ok(())
    }

    fn backup_prefix(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{name}.{BACKUP_INFIX}.")
    }

    /// Existing backups, oldest first
    fn backup_paths(&self) -> Vec<PathBuf> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = self.backup_prefix();

        let mut paths: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix))
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }

    fn rotate_backup(&self) -> Result<(), WriteError> {
        if !self.path.exists() {
            return Ok(());
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let backup = self
            .path
            .with_file_name(format!("{}{stamp}", self.backup_prefix()));
        fs::copy(&self.path, &backup).map_err(|e| WriteError::io(&backup, e))?;

        let backups = self.backup_paths();
        let excess = backups.len().saturating_sub(self.backup_retention);
        for old in backups.iter().take(excess) {
            if let Err(e) = fs::remove_file(old) {
                warn!(path = %old.display(), error = %e, "Failed to prune checkpoint backup");
            }
        }

        sync_parent_dir(&self.path)
    }
}

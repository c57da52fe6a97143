//! # Component Factory
//!
//! Builds every engine component from one [`EngineConfig`] and caches the ones
//! that own a file, so each artifact has exactly one writer per process.

use crate::config::{ConfigurationResolver, EngineConfig};
use crate::cost::{CostEstimator, CostPolicy};
use crate::error::{ConfigError, WriteError};
use crate::orchestration::retry::RetryExecutor;
use crate::orchestration::strategy::ProcessingStrategy;
use crate::persistence::{AtomicRecordWriter, CheckpointStore, ProgressTracker};
use crate::recovery::{BackoffPolicy, ErrorClassifier, StandardErrorClassifier};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct ComponentFactory {
    config: Arc<EngineConfig>,
    run_id: String,
    resolver: Arc<ConfigurationResolver>,
    classifier: Arc<dyn ErrorClassifier>,
    writers: DashMap<PathBuf, Arc<AtomicRecordWriter>>,
    checkpoint_stores: DashMap<PathBuf, Arc<CheckpointStore>>,
    trackers: DashMap<PathBuf, Arc<ProgressTracker>>,
}

impl std::fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("run_id", &self.run_id)
            .field("profile", &self.config.engine.profile)
            .field("strategy", &self.config.engine.strategy)
            .finish()
    }
}

impl ComponentFactory {
    /// Validate `config` and prepare the shared components
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let backoff = BackoffPolicy::from(&config.backoff);
        let run_id = config
            .engine
            .run_label
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        info!(
            run_id = %run_id,
            profile = %config.engine.profile,
            strategy = %config.engine.strategy,
            "🏭 Component factory initialized"
        );

        Ok(Self {
            resolver: Arc::new(ConfigurationResolver::new(config.profiles.clone())),
            classifier: Arc::new(StandardErrorClassifier::with_backoff(backoff)),
            config: Arc::new(config),
            run_id,
            writers: DashMap::new(),
            checkpoint_stores: DashMap::new(),
            trackers: DashMap::new(),
        })
    }

    /// Replace the error classifier used by retry executors built afterwards
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn resolver(&self) -> Arc<ConfigurationResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn classifier(&self) -> Arc<dyn ErrorClassifier> {
        Arc::clone(&self.classifier)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::from(&self.config.backoff)
    }

    /// Configured strategy with the attempt override applied
    pub fn strategy(&self) -> ProcessingStrategy {
        let strategy = ProcessingStrategy::for_kind(self.config.engine.strategy);
        match self.config.retry.max_attempts_override {
            Some(attempts) => strategy.with_max_attempts(attempts),
            None => strategy,
        }
    }

    pub fn record_writer(&self) -> Result<Arc<AtomicRecordWriter>, WriteError> {
        let path = self.config.paths.record_log.clone();
        match self.writers.entry(path) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let writer = Arc::new(AtomicRecordWriter::open(entry.key().clone())?);
                debug!(path = %writer.path().display(), "Created record writer");
                Ok(Arc::clone(entry.insert(writer).value()))
            }
        }
    }

    pub fn checkpoint_store(&self) -> Arc<CheckpointStore> {
        let paths = &self.config.paths;
        self.checkpoint_stores
            .entry(paths.checkpoint.clone())
            .or_insert_with(|| {
                Arc::new(
                    CheckpointStore::new(&paths.checkpoint, &paths.record_log)
                        .with_backup_retention(paths.checkpoint_backups),
                )
            })
            .value()
            .clone()
    }

    pub fn progress_tracker(&self) -> Arc<ProgressTracker> {
        let path = self.config.paths.progress.clone();
        self.trackers
            .entry(path.clone())
            .or_insert_with(|| Arc::new(ProgressTracker::new(path, self.run_id.clone())))
            .value()
            .clone()
    }

    pub fn retry_executor(&self) -> RetryExecutor {
        let strategy = self.strategy();
        RetryExecutor::new(
            self.classifier(),
            self.backoff_policy(),
            self.config.engine.transform_timeout(),
            strategy.max_attempts,
        )
        .with_retry_malformed(strategy.retry_malformed)
    }

    /// Fresh estimator sized for the run; never cached
    pub fn cost_estimator(&self, expected_items: Option<u64>) -> Arc<dyn CostEstimator> {
        CostPolicy::select(&self.config.cost, expected_items)
    }
}

//! Experiment Registry
//!
//! Holds experiment definitions and their lifecycle state. Reads are
//! lock-free (`DashMap` of `Arc` snapshots); administrative writes
//! (create, status changes, edits) go through a single-writer lock and
//! swap in a new snapshot, so readers never observe a partial change.
//!
//! The cumulative-weight [`BucketTable`] is built once each time an
//! experiment enters Running and travels with its snapshot.

use crate::experiment::{BucketTable, Experiment, ExperimentPatch, ExperimentStatus, WeightError};
use crate::{Error, Result};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Immutable snapshot of a registered experiment.
#[derive(Debug, Clone)]
pub struct RegisteredExperiment {
    experiment: Experiment,
    buckets: Option<std::result::Result<BucketTable, WeightError>>,
}

impl RegisteredExperiment {
    fn new(experiment: Experiment) -> Self {
        let buckets = (experiment.status() == ExperimentStatus::Running)
            .then(|| BucketTable::build(experiment.variants()));
        Self {
            experiment,
            buckets,
        }
    }

    /// Get the experiment definition.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Bucket table of a Running experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the experiment is not Running or
    /// its variants cannot be bucketed (corrupt definition).
    pub fn bucket_table(&self) -> Result<&BucketTable> {
        match &self.buckets {
            Some(Ok(table)) => Ok(table),
            Some(Err(err)) => Err(Error::Configuration(format!(
                "experiment {}: {err}",
                self.experiment.id()
            ))),
            None => Err(Error::Configuration(format!(
                "experiment {} has no active bucket table (status {})",
                self.experiment.id(),
                self.experiment.status()
            ))),
        }
    }
}

/// Registry of experiment definitions.
///
/// # Example
///
/// ```rust
/// use splitbench::experiment::{Experiment, ExperimentStatus, Variant};
/// use splitbench::registry::ExperimentRegistry;
///
/// let registry = ExperimentRegistry::new();
/// registry.create(
///     Experiment::builder("exp-1", "Download button")
///         .variant(Variant::new("control", 50.0))
///         .variant(Variant::new("green", 50.0))
///         .primary_metric("download")
///         .build(),
/// )?;
/// registry.set_status("exp-1", ExperimentStatus::Running)?;
/// assert_eq!(registry.list_active().len(), 1);
/// # Ok::<(), splitbench::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    experiments: DashMap<String, Arc<RegisteredExperiment>>,
    admin: Mutex<()>,
}

impl ExperimentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Register a new Draft experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentExists`] for a duplicate id, or
    /// [`Error::Configuration`] if the definition is invalid or not a Draft.
    pub fn create(&self, experiment: Experiment) -> Result<()> {
        experiment.validate()?;
        if experiment.status() != ExperimentStatus::Draft {
            return Err(Error::Configuration(format!(
                "experiment {} must be created as draft, got {}",
                experiment.id(),
                experiment.status()
            )));
        }
        let _guard = self.admin.lock();
        self.insert_new(experiment)?;
        Ok(())
    }

    /// Register a stored definition, keeping its status.
    ///
    /// Stored data is taken as-is: a Running definition whose variants
    /// cannot be bucketed is kept, and assignment calls for it fail with
    /// [`Error::Configuration`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentExists`] for a duplicate id.
    pub fn restore(&self, experiment: Experiment) -> Result<()> {
        let _guard = self.admin.lock();
        let entry = self.insert_new(experiment)?;
        if let Some(Err(err)) = &entry.buckets {
            warn!(experiment_id = entry.experiment.id(), error = %err, "restored experiment cannot be bucketed");
        }
        Ok(())
    }

    fn insert_new(&self, experiment: Experiment) -> Result<Arc<RegisteredExperiment>> {
        match self.experiments.entry(experiment.id().to_string()) {
            Entry::Occupied(_) => Err(Error::ExperimentExists(experiment.id().to_string())),
            Entry::Vacant(slot) => {
                info!(
                    experiment_id = experiment.id(),
                    status = %experiment.status(),
                    variants = experiment.variants().len(),
                    "experiment registered"
                );
                let entry = Arc::new(RegisteredExperiment::new(experiment));
                slot.insert(Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    /// Get an experiment snapshot by ID.
    #[must_use]
    pub fn get(&self, experiment_id: &str) -> Option<Arc<RegisteredExperiment>> {
        self.experiments.get(experiment_id).map(|e| Arc::clone(e.value()))
    }

    /// All experiments, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<RegisteredExperiment>> {
        let mut all: Vec<_> = self.experiments.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.experiment.id().cmp(b.experiment.id()));
        all
    }

    /// Running experiments, ordered by id.
    #[must_use]
    pub fn list_active(&self) -> Vec<Arc<RegisteredExperiment>> {
        self.list()
            .into_iter()
            .filter(|e| e.experiment.status() == ExperimentStatus::Running)
            .collect()
    }

    /// Change the lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] or [`Error::InvalidTransition`];
    /// on error nothing changes.
    pub fn set_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<Arc<RegisteredExperiment>> {
        let _guard = self.admin.lock();
        let current = self
            .get(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;

        let mut experiment = current.experiment.clone();
        experiment.transition(status, Utc::now())?;

        let from = current.experiment.status();
        let entry = Arc::new(RegisteredExperiment::new(experiment));
        self.experiments
            .insert(experiment_id.to_string(), Arc::clone(&entry));
        info!(experiment_id, %from, to = %status, "experiment status changed");
        Ok(entry)
    }

    /// Edit a Draft experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`], [`Error::NotEditable`] outside
    /// Draft, or [`Error::Configuration`] if the result is invalid.
    pub fn update(
        &self,
        experiment_id: &str,
        patch: ExperimentPatch,
    ) -> Result<Arc<RegisteredExperiment>> {
        let _guard = self.admin.lock();
        let current = self
            .get(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;

        let mut experiment = current.experiment.clone();
        experiment.apply(patch)?;

        let entry = Arc::new(RegisteredExperiment::new(experiment));
        self.experiments
            .insert(experiment_id.to_string(), Arc::clone(&entry));
        info!(experiment_id, "experiment definition updated");
        Ok(entry)
    }

    /// Serialize all definitions (ordered by id) as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        let definitions: Vec<Experiment> = self
            .list()
            .iter()
            .map(|e| e.experiment.clone())
            .collect();
        Ok(serde_json::to_string_pretty(&definitions)?)
    }

    /// Build a registry from a JSON array of definitions, keeping statuses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] for malformed JSON or
    /// [`Error::ExperimentExists`] for duplicate ids.
    pub fn from_json(json: &str) -> Result<Self> {
        let definitions: Vec<Experiment> = serde_json::from_str(json)?;
        let registry = Self::new();
        for experiment in definitions {
            registry.restore(experiment)?;
        }
        Ok(registry)
    }

    /// Load definitions from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`ExperimentRegistry::from_json`].
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write definitions to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Serialization`].
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

//! # Splitbench: Deterministic Experiment Assignment
//!
//! **Version**: 0.1.0
//!
//! Splitbench buckets users and anonymous sessions into A/B experiment
//! variants, persists each assignment so an actor never flips variants,
//! attributes conversions to stored assignments and derives per-variant
//! results with a two-proportion z-test.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: Atomic create-if-absent writes; corrupt
//!   definitions fail loudly instead of defaulting to a variant
//! - **Jidoka**: Results are always re-derivable from stored assignments
//!   and conversion events
//! - **Heijunka**: Eligibility and selection are pure functions, safe to
//!   run in parallel without locks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use splitbench::actor::Actor;
//! use splitbench::events::TracingEventSink;
//! use splitbench::experiment::{Experiment, ExperimentStatus, Variant};
//! use splitbench::store::MemoryAssignmentStore;
//! use splitbench::Splitbench;
//!
//! # async fn example() -> splitbench::Result<()> {
//! let service = Splitbench::builder(
//!     Arc::new(MemoryAssignmentStore::new()),
//!     Arc::new(TracingEventSink),
//! )
//! .build()?;
//!
//! service.create_experiment(
//!     Experiment::builder("e1", "Download button")
//!         .variant(Variant::new("control", 50.0))
//!         .variant(Variant::new("green", 50.0))
//!         .primary_metric("download")
//!         .build(),
//! )?;
//! service.set_status("e1", ExperimentStatus::Running)?;
//!
//! let actor = Actor::new("u1");
//! let variant = service.get_variant("e1", &actor).await?;
//! service.track_conversion("e1", &actor, "download", None).await?;
//! let results = service.get_results("e1").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod actor;
pub mod config;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod events;
pub mod experiment;
pub mod hash;
pub mod registry;
pub mod results;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};

use actor::Actor;
use config::AnalysisConfig;
use engine::AssignmentEngine;
use events::EventSink;
use experiment::{Experiment, ExperimentPatch, ExperimentStatus, Variant};
use registry::{ExperimentRegistry, RegisteredExperiment};
use results::{ExperimentResults, ResultsAggregator};
use std::sync::Arc;
use store::{AssignmentStore, ConversionStore};
use tracker::{ConversionTracker, TrackOutcome};

/// Registry, engine, tracker and aggregator wired to one store and sink.
///
/// The aggregator's result cache is shared with the engine and tracker so
/// new assignments and conversions invalidate it.
#[derive(Debug)]
pub struct Splitbench<S, E> {
    registry: Arc<ExperimentRegistry>,
    engine: AssignmentEngine<S, E>,
    tracker: ConversionTracker<S, E>,
    aggregator: ResultsAggregator<S>,
}

impl<S, E> Splitbench<S, E>
where
    S: AssignmentStore + ConversionStore,
    E: EventSink,
{
    /// Create a builder over a store and an event sink.
    #[must_use]
    pub fn builder(store: Arc<S>, sink: Arc<E>) -> SplitbenchBuilder<S, E> {
        SplitbenchBuilder::new(store, sink)
    }

    /// Get the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ExperimentRegistry> {
        &self.registry
    }

    /// Get the assignment engine.
    #[must_use]
    pub const fn engine(&self) -> &AssignmentEngine<S, E> {
        &self.engine
    }

    /// Get the conversion tracker.
    #[must_use]
    pub const fn tracker(&self) -> &ConversionTracker<S, E> {
        &self.tracker
    }

    /// Get the results aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &ResultsAggregator<S> {
        &self.aggregator
    }

    /// Register a Draft experiment.
    ///
    /// # Errors
    ///
    /// See [`ExperimentRegistry::create`].
    pub fn create_experiment(&self, experiment: Experiment) -> Result<()> {
        self.registry.create(experiment)
    }

    /// Edit a Draft experiment.
    ///
    /// # Errors
    ///
    /// See [`ExperimentRegistry::update`].
    pub fn update_experiment(
        &self,
        experiment_id: &str,
        patch: ExperimentPatch,
    ) -> Result<Arc<RegisteredExperiment>> {
        self.registry.update(experiment_id, patch)
    }

    /// Change an experiment's lifecycle status.
    ///
    /// # Errors
    ///
    /// See [`ExperimentRegistry::set_status`].
    pub fn set_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<Arc<RegisteredExperiment>> {
        self.registry.set_status(experiment_id, status)
    }

    /// Running experiments.
    #[must_use]
    pub fn list_active(&self) -> Vec<Arc<RegisteredExperiment>> {
        self.registry.list_active()
    }

    /// See [`AssignmentEngine::get_variant`].
    ///
    /// # Errors
    ///
    /// See [`AssignmentEngine::get_variant`].
    pub async fn get_variant(&self, experiment_id: &str, actor: &Actor) -> Result<Option<Variant>> {
        self.engine.get_variant(experiment_id, actor).await
    }

    /// See [`ConversionTracker::track_conversion`].
    ///
    /// # Errors
    ///
    /// See [`ConversionTracker::track_conversion`].
    pub async fn track_conversion(
        &self,
        experiment_id: &str,
        actor: &Actor,
        metric: &str,
        value: Option<f64>,
    ) -> Result<TrackOutcome> {
        self.tracker
            .track_conversion(experiment_id, actor, metric, value)
            .await
    }

    /// See [`ResultsAggregator::get_results`].
    ///
    /// # Errors
    ///
    /// See [`ResultsAggregator::get_results`].
    pub async fn get_results(&self, experiment_id: &str) -> Result<Arc<ExperimentResults>> {
        self.aggregator.get_results(experiment_id).await
    }
}

/// Builder for `Splitbench`.
#[derive(Debug)]
pub struct SplitbenchBuilder<S, E> {
    store: Arc<S>,
    sink: Arc<E>,
    registry: Option<Arc<ExperimentRegistry>>,
    analysis: AnalysisConfig,
}

impl<S, E> SplitbenchBuilder<S, E>
where
    S: AssignmentStore + ConversionStore,
    E: EventSink,
{
    /// Create a builder with an empty registry and default analysis config.
    #[must_use]
    pub fn new(store: Arc<S>, sink: Arc<E>) -> Self {
        Self {
            store,
            sink,
            registry: None,
            analysis: AnalysisConfig::default(),
        }
    }

    /// Use an existing registry (e.g. loaded from a definitions file).
    #[must_use]
    pub fn registry(mut self, registry: Arc<ExperimentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the analysis config.
    #[must_use]
    pub const fn analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the analysis config is invalid.
    pub fn build(self) -> Result<Splitbench<S, E>> {
        self.analysis.validate()?;
        let registry = self.registry.unwrap_or_default();
        let aggregator =
            ResultsAggregator::new(Arc::clone(&registry), Arc::clone(&self.store), self.analysis);
        let engine = AssignmentEngine::new(
            Arc::clone(&registry),
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
        )
        .with_results_cache(aggregator.cache());
        let tracker =
            ConversionTracker::new(self.store, self.sink).with_results_cache(aggregator.cache());

        Ok(Splitbench {
            registry,
            engine,
            tracker,
            aggregator,
        })
    }
}

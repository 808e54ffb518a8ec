//! Results aggregation
//!
//! Results are derived, never a source of truth: [`compute_results`] is a
//! pure function of the experiment definition, its stored assignments and
//! its conversion events. [`ResultsAggregator`] reads those from the store
//! and caches the outcome until the tracker or engine invalidates it.
//!
//! ## Counting rules
//!
//! - `participants`: distinct actors with an assignment to the variant
//! - `conversions`: distinct participants with at least one event on the
//!   primary metric
//! - `total_value`: sum of event values on the primary metric
//! - secondary metrics: distinct converters per metric
//!
//! The control is the first declared variant. Each other variant is
//! compared against it with [`two_proportion_z_test`].

mod stats;

pub use stats::{rate, two_proportion_z_test, ZTest};

use crate::config::AnalysisConfig;
use crate::experiment::{Experiment, ExperimentStatus};
use crate::registry::ExperimentRegistry;
use crate::store::{Assignment, AssignmentStore, ConversionEvent, ConversionStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-variant outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantResults {
    /// Variant id
    pub variant_id: String,
    /// Whether this is the control arm
    pub is_control: bool,
    /// Distinct assigned actors
    pub participants: u64,
    /// Distinct actors converting on the primary metric
    pub conversions: u64,
    /// `conversions / participants` (0.0 without participants)
    pub conversion_rate: f64,
    /// Confidence that the rate differs from control (`None` for control)
    pub confidence: Option<f64>,
    /// Relative change vs control rate (`None` for control or zero control rate)
    pub lift: Option<f64>,
    /// Sum of primary-metric event values
    pub total_value: f64,
    /// Distinct converters per secondary metric
    pub secondary_conversions: BTreeMap<String, u64>,
}

/// Aggregated outcome of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentResults {
    /// Experiment id
    pub experiment_id: String,
    /// Status at computation time
    pub status: ExperimentStatus,
    /// Primary metric the results are judged on
    pub primary_metric: String,
    /// Per-variant results in declaration order
    pub variants: Vec<VariantResults>,
    /// True when some variant beats control above the confidence threshold
    pub statistically_significant: bool,
    /// Best significant variant, if any
    pub winning_variant_id: Option<String>,
    /// Computation time
    pub computed_at: DateTime<Utc>,
}

impl ExperimentResults {
    /// Look up a variant's results.
    #[must_use]
    pub fn variant(&self, variant_id: &str) -> Option<&VariantResults> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }

    /// Total participants across variants.
    #[must_use]
    pub fn total_participants(&self) -> u64 {
        self.variants.iter().map(|v| v.participants).sum()
    }
}

/// Derive results from stored assignments and conversion events.
///
/// Assignments or events naming variants the experiment does not declare
/// are skipped with a warning. Events from actors without an assignment
/// are ignored.
#[must_use]
pub fn compute_results(
    experiment: &Experiment,
    assignments: &[Assignment],
    conversions: &[ConversionEvent],
    config: &AnalysisConfig,
) -> ExperimentResults {
    let primary = experiment.metrics().primary.as_str();
    let index: FxHashMap<&str, usize> = experiment
        .variants()
        .iter()
        .enumerate()
        .map(|(i, v)| (v.id(), i))
        .collect();

    let mut participants = vec![0_u64; index.len()];
    let mut actor_variant: FxHashMap<&str, usize> = FxHashMap::default();
    for assignment in assignments {
        if assignment.experiment_id() != experiment.id() {
            continue;
        }
        let Some(&i) = index.get(assignment.variant_id()) else {
            warn!(
                experiment_id = experiment.id(),
                variant_id = assignment.variant_id(),
                "assignment references unknown variant"
            );
            continue;
        };
        if !actor_variant.contains_key(assignment.actor_key()) {
            actor_variant.insert(assignment.actor_key(), i);
            participants[i] += 1;
        }
    }

    let mut converted: FxHashSet<(&str, &str)> = FxHashSet::default();
    let mut total_value = vec![0.0_f64; index.len()];
    let mut secondary: Vec<BTreeMap<String, u64>> = vec![BTreeMap::new(); index.len()];
    for event in conversions {
        if event.experiment_id() != experiment.id() {
            continue;
        }
        // The assignment, not the event, decides the variant
        let Some(&i) = actor_variant.get(event.actor_key()) else {
            continue;
        };
        if event.metric() == primary {
            total_value[i] += event.value().unwrap_or(0.0);
            converted.insert((primary, event.actor_key()));
        } else if experiment.metrics().secondary.iter().any(|m| m == event.metric())
            && converted.insert((event.metric(), event.actor_key()))
        {
            *secondary[i].entry(event.metric().to_string()).or_insert(0) += 1;
        }
    }

    let mut conversions_per_variant = vec![0_u64; index.len()];
    for (metric, actor) in &converted {
        if *metric == primary {
            if let Some(&i) = actor_variant.get(actor) {
                conversions_per_variant[i] += 1;
            }
        }
    }

    let control = (
        conversions_per_variant.first().copied().unwrap_or(0),
        participants.first().copied().unwrap_or(0),
    );
    let control_rate = rate(control.0, control.1);

    let mut variants = Vec::with_capacity(index.len());
    let mut winner: Option<(usize, f64, f64)> = None;
    for (i, variant) in experiment.variants().iter().enumerate() {
        let arm = (conversions_per_variant[i], participants[i]);
        let conversion_rate = rate(arm.0, arm.1);
        let is_control = i == 0;

        let (confidence, lift) = if is_control {
            (None, None)
        } else {
            let test = two_proportion_z_test(control, arm);
            let lift = (control_rate > 0.0).then(|| (conversion_rate - control_rate) / control_rate);
            let enough = control.1 >= config.min_participants_per_variant
                && arm.1 >= config.min_participants_per_variant;
            if enough && conversion_rate > control_rate && test.confidence > config.confidence_threshold {
                let better = winner.map_or(true, |(_, best_rate, best_conf)| {
                    conversion_rate > best_rate
                        || ((conversion_rate - best_rate).abs() < f64::EPSILON
                            && test.confidence > best_conf)
                });
                if better {
                    winner = Some((i, conversion_rate, test.confidence));
                }
            }
            (Some(test.confidence), lift)
        };

        variants.push(VariantResults {
            variant_id: variant.id().to_string(),
            is_control,
            participants: arm.1,
            conversions: arm.0,
            conversion_rate,
            confidence,
            lift,
            total_value: total_value[i],
            secondary_conversions: std::mem::take(&mut secondary[i]),
        });
    }

    let winning_variant_id = winner.map(|(i, _, _)| experiment.variants()[i].id().to_string());
    ExperimentResults {
        experiment_id: experiment.id().to_string(),
        status: experiment.status(),
        primary_metric: primary.to_string(),
        variants,
        statistically_significant: winning_variant_id.is_some(),
        winning_variant_id,
        computed_at: Utc::now(),
    }
}

/// Cached results with generation-checked writes.
///
/// A computation only lands in the cache if no invalidation happened
/// since it started, so a cached entry never predates a recorded event.
#[derive(Debug, Default)]
pub struct ResultsCache {
    entries: DashMap<String, Arc<ExperimentResults>>,
    generations: DashMap<String, u64>,
}

impl ResultsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached results, if fresh.
    #[must_use]
    pub fn get(&self, experiment_id: &str) -> Option<Arc<ExperimentResults>> {
        self.entries.get(experiment_id).map(|e| Arc::clone(e.value()))
    }

    /// Drop cached results for an experiment.
    pub fn invalidate(&self, experiment_id: &str) {
        let mut generation = self.generations.entry(experiment_id.to_string()).or_insert(0);
        *generation += 1;
        self.entries.remove(experiment_id);
    }

    fn generation(&self, experiment_id: &str) -> u64 {
        self.generations.get(experiment_id).map_or(0, |g| *g.value())
    }

    fn insert_if_current(&self, generation: u64, results: Arc<ExperimentResults>) {
        let current = self
            .generations
            .entry(results.experiment_id.clone())
            .or_insert(0);
        if *current == generation {
            self.entries.insert(results.experiment_id.clone(), results);
        }
    }
}

/// Reads assignments and conversions from the store and computes results.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use splitbench::config::AnalysisConfig;
/// use splitbench::registry::ExperimentRegistry;
/// use splitbench::results::ResultsAggregator;
/// use splitbench::store::MemoryAssignmentStore;
///
/// # async fn example() -> splitbench::Result<()> {
/// let registry = Arc::new(ExperimentRegistry::new());
/// let store = Arc::new(MemoryAssignmentStore::new());
/// let aggregator = ResultsAggregator::new(registry, store, AnalysisConfig::default());
///
/// let results = aggregator.get_results("exp-1").await?;
/// println!("winner: {:?}", results.winning_variant_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResultsAggregator<S> {
    registry: Arc<ExperimentRegistry>,
    store: Arc<S>,
    config: AnalysisConfig,
    cache: Arc<ResultsCache>,
}

impl<S> ResultsAggregator<S>
where
    S: AssignmentStore + ConversionStore,
{
    /// Create an aggregator with an empty cache.
    #[must_use]
    pub fn new(registry: Arc<ExperimentRegistry>, store: Arc<S>, config: AnalysisConfig) -> Self {
        Self {
            registry,
            store,
            config,
            cache: Arc::new(ResultsCache::new()),
        }
    }

    /// Get the analysis config.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Shared cache handle, for wiring invalidation into the engine.
    #[must_use]
    pub fn cache(&self) -> Arc<ResultsCache> {
        Arc::clone(&self.cache)
    }

    /// Drop cached results for an experiment.
    pub fn invalidate(&self, experiment_id: &str) {
        self.cache.invalidate(experiment_id);
    }

    /// Results for an experiment in any status, cached until invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for unknown ids, or store
    /// errors from reading assignments/conversions.
    pub async fn get_results(&self, experiment_id: &str) -> Result<Arc<ExperimentResults>> {
        if let Some(cached) = self.cache.get(experiment_id) {
            // Status changes do not invalidate; refresh if it moved
            let status = self.registry.get(experiment_id).map(|e| e.experiment().status());
            if status == Some(cached.status) {
                return Ok(cached);
            }
        }
        self.recompute(experiment_id).await
    }

    /// Recompute from the store, bypassing the cache.
    ///
    /// # Errors
    ///
    /// As [`ResultsAggregator::get_results`].
    pub async fn recompute(&self, experiment_id: &str) -> Result<Arc<ExperimentResults>> {
        let entry = self
            .registry
            .get(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;

        let generation = self.cache.generation(experiment_id);
        let assignments = self.store.list_assignments(experiment_id).await?;
        let conversions = self.store.list_conversions(experiment_id).await?;

        let results = Arc::new(compute_results(
            entry.experiment(),
            &assignments,
            &conversions,
            &self.config,
        ));
        debug!(
            experiment_id,
            participants = results.total_participants(),
            significant = results.statistically_significant,
            "results computed"
        );
        self.cache.insert_if_current(generation, Arc::clone(&results));
        Ok(results)
    }
}

//! Assignment Engine
//!
//! Given an experiment and an actor, returns a variant, consulting the
//! registry, the assignment store, the eligibility filter and the hash in
//! that order:
//!
//! 1. Experiment missing, not Running or outside its schedule: `None`
//! 2. Stored assignment: returned as-is (wins over eligibility and weights)
//! 3. Ineligible actor: `None`, nothing persisted (re-evaluated next call)
//! 4. Otherwise select by cumulative weight, persist create-if-absent and
//!    emit an exposure event for the first assignment only
//!
//! A store failure never hides the computed variant: it is attached to
//! [`Error::StoreUnavailable`] so the current request can still use it.

use crate::actor::Actor;
use crate::eligibility::{self, Eligibility, Rejection};
use crate::events::{EventSink, ExperimentEvent, ExposureEvent, TracingEventSink};
use crate::experiment::{ExperimentStatus, Variant};
use crate::hash::bucket;
use crate::registry::{ExperimentRegistry, RegisteredExperiment};
use crate::results::ResultsCache;
use crate::store::{Assignment, AssignmentStore, Insertion};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why no variant was assigned. Callers treat every reason the same
/// (show the default experience); the distinction is for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Unknown experiment id
    NotFound,
    /// Experiment is Draft, Paused or Completed
    NotRunning(ExperimentStatus),
    /// Running but before its start date or after its end date
    OutsideSchedule,
    /// Actor failed a targeting gate
    Ineligible(Rejection),
}

/// Detailed outcome of an assignment request.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentDecision {
    /// Actor is in the experiment.
    Assigned {
        /// The actor's variant
        variant: Variant,
        /// True only for the call that created the assignment
        first_exposure: bool,
    },
    /// Actor is not in the experiment.
    Skipped(SkipReason),
}

impl AssignmentDecision {
    /// The assigned variant, if any.
    #[must_use]
    pub fn into_variant(self) -> Option<Variant> {
        match self {
            Self::Assigned { variant, .. } => Some(variant),
            Self::Skipped(_) => None,
        }
    }
}

/// Deterministic variant assignment backed by an [`AssignmentStore`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use splitbench::actor::Actor;
/// use splitbench::engine::AssignmentEngine;
/// use splitbench::events::TracingEventSink;
/// use splitbench::registry::ExperimentRegistry;
/// use splitbench::store::MemoryAssignmentStore;
///
/// # async fn example() -> splitbench::Result<()> {
/// let registry = Arc::new(ExperimentRegistry::load_file("experiments.json")?);
/// let engine = AssignmentEngine::new(
///     registry,
///     Arc::new(MemoryAssignmentStore::new()),
///     Arc::new(TracingEventSink),
/// );
///
/// match engine.get_variant("hero-cta", &Actor::new("user-42")).await? {
///     Some(variant) => println!("show {}", variant.id()),
///     None => println!("show default"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AssignmentEngine<S, E = TracingEventSink> {
    registry: Arc<ExperimentRegistry>,
    store: Arc<S>,
    sink: Arc<E>,
    results_cache: Option<Arc<ResultsCache>>,
}

impl<S, E> AssignmentEngine<S, E>
where
    S: AssignmentStore,
    E: EventSink,
{
    /// Create an engine.
    #[must_use]
    pub const fn new(registry: Arc<ExperimentRegistry>, store: Arc<S>, sink: Arc<E>) -> Self {
        Self {
            registry,
            store,
            sink,
            results_cache: None,
        }
    }

    /// Invalidate cached results whenever a new assignment is created.
    #[must_use]
    pub fn with_results_cache(mut self, cache: Arc<ResultsCache>) -> Self {
        self.results_cache = Some(cache);
        self
    }

    /// Get the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ExperimentRegistry> {
        &self.registry
    }

    /// Get the assignment store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The actor's variant, or `None` if the actor is not in the experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a corrupt experiment definition,
    /// or [`Error::StoreUnavailable`] (with the computed variant attached
    /// when there is one) if the store failed.
    pub async fn get_variant(&self, experiment_id: &str, actor: &Actor) -> Result<Option<Variant>> {
        Ok(self.evaluate(experiment_id, actor).await?.into_variant())
    }

    /// Like [`AssignmentEngine::get_variant`], but reports why an actor was
    /// skipped and whether this call created the assignment.
    ///
    /// # Errors
    ///
    /// As [`AssignmentEngine::get_variant`].
    pub async fn evaluate(&self, experiment_id: &str, actor: &Actor) -> Result<AssignmentDecision> {
        let entry = match self.assignable(experiment_id) {
            Ok(entry) => entry,
            Err(reason) => return Ok(skip(experiment_id, actor, reason)),
        };
        let experiment = entry.experiment();
        let table = entry.bucket_table()?;

        match self.store.get_assignment(experiment_id, actor.key()).await {
            Ok(Some(existing)) => {
                let variant = stored_variant(&entry, &existing)?;
                return Ok(AssignmentDecision::Assigned {
                    variant,
                    first_exposure: false,
                });
            }
            Ok(None) => {}
            Err(err) => {
                warn!(experiment_id, actor_key = actor.key(), error = %err, "assignment lookup failed");
                let fallback = eligibility::evaluate(experiment, actor)
                    .is_eligible()
                    .then(|| experiment.variants()[table.select(bucket(actor.key()))].clone());
                return Err(with_fallback(err, fallback));
            }
        }

        if let Eligibility::Ineligible(rejection) = eligibility::evaluate(experiment, actor) {
            return Ok(skip(experiment_id, actor, SkipReason::Ineligible(rejection)));
        }

        let selected = &experiment.variants()[table.select(bucket(actor.key()))];
        self.persist(&entry, actor.key(), selected).await
    }

    /// The variant an actor would get right now, without touching the
    /// store. Ignores existing assignments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a corrupt experiment definition.
    pub fn compute_variant(&self, experiment_id: &str, actor: &Actor) -> Result<Option<Variant>> {
        let Ok(entry) = self.assignable(experiment_id) else {
            return Ok(None);
        };
        let table = entry.bucket_table()?;
        let experiment = entry.experiment();
        if !eligibility::is_eligible(experiment, actor) {
            return Ok(None);
        }
        Ok(Some(
            experiment.variants()[table.select(bucket(actor.key()))].clone(),
        ))
    }

    /// Retry persisting a pairing after [`Error::StoreUnavailable`].
    ///
    /// The pairing is re-derived from `actor`, so only the variant the
    /// engine itself would assign can be written. Uses the same
    /// create-if-absent primitive, so the returned variant is whichever one
    /// is stored, which may differ from `variant_id` if another request won.
    /// Returns `None` if the experiment is no longer assignable or the actor
    /// is not eligible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `variant_id` is not the variant
    /// computed for `actor`, or [`Error::StoreUnavailable`] if the store
    /// fails again.
    pub async fn persist_assignment(
        &self,
        experiment_id: &str,
        actor: &Actor,
        variant_id: &str,
    ) -> Result<Option<Variant>> {
        let Ok(entry) = self.assignable(experiment_id) else {
            return Ok(None);
        };
        let table = entry.bucket_table()?;
        let experiment = entry.experiment();
        if !eligibility::is_eligible(experiment, actor) {
            debug!(experiment_id, actor_key = actor.key(), "retry skipped, actor not eligible");
            return Ok(None);
        }
        let computed = &experiment.variants()[table.select(bucket(actor.key()))];
        if computed.id() != variant_id {
            return Err(Error::Configuration(format!(
                "experiment {experiment_id} assigns {} to {}, not {variant_id}",
                computed.id(),
                actor.key()
            )));
        }
        let decision = self.persist(&entry, actor.key(), computed).await?;
        Ok(decision.into_variant())
    }

    fn assignable(
        &self,
        experiment_id: &str,
    ) -> std::result::Result<Arc<RegisteredExperiment>, SkipReason> {
        let entry = self.registry.get(experiment_id).ok_or(SkipReason::NotFound)?;
        let experiment = entry.experiment();
        if experiment.status() != ExperimentStatus::Running {
            return Err(SkipReason::NotRunning(experiment.status()));
        }
        if !experiment.in_schedule(Utc::now()) {
            return Err(SkipReason::OutsideSchedule);
        }
        Ok(entry)
    }

    async fn persist(
        &self,
        entry: &RegisteredExperiment,
        actor_key: &str,
        selected: &Variant,
    ) -> Result<AssignmentDecision> {
        let experiment_id = entry.experiment().id();
        let insertion = match self
            .store
            .create_assignment_if_absent(experiment_id, actor_key, selected.id())
            .await
        {
            Ok(insertion) => insertion,
            Err(err) => {
                warn!(experiment_id, actor_key, variant_id = selected.id(), error = %err, "assignment not persisted");
                return Err(with_fallback(err, Some(selected.clone())));
            }
        };

        match insertion {
            Insertion::Created(assignment) => {
                info!(experiment_id, actor_key, variant_id = assignment.variant_id(), "actor assigned");
                self.sink.emit(ExperimentEvent::Exposure(ExposureEvent {
                    experiment_id: assignment.experiment_id().to_string(),
                    variant_id: assignment.variant_id().to_string(),
                    actor_key: assignment.actor_key().to_string(),
                    timestamp: assignment.assigned_at(),
                }));
                if let Some(cache) = &self.results_cache {
                    cache.invalidate(experiment_id);
                }
                Ok(AssignmentDecision::Assigned {
                    variant: selected.clone(),
                    first_exposure: true,
                })
            }
            // A concurrent request stored first; its variant wins
            Insertion::Existing(assignment) => Ok(AssignmentDecision::Assigned {
                variant: stored_variant(entry, &assignment)?,
                first_exposure: false,
            }),
        }
    }
}

fn skip(experiment_id: &str, actor: &Actor, reason: SkipReason) -> AssignmentDecision {
    debug!(experiment_id, actor_key = actor.key(), ?reason, "no assignment");
    AssignmentDecision::Skipped(reason)
}

fn stored_variant(entry: &RegisteredExperiment, assignment: &Assignment) -> Result<Variant> {
    entry
        .experiment()
        .variant(assignment.variant_id())
        .cloned()
        .ok_or_else(|| {
            Error::Configuration(format!(
                "experiment {}: stored assignment for {} references unknown variant {}",
                assignment.experiment_id(),
                assignment.actor_key(),
                assignment.variant_id()
            ))
        })
}

fn with_fallback(err: Error, fallback: Option<Variant>) -> Error {
    let message = match err {
        Error::StoreUnavailable { message, .. } => message,
        other => other.to_string(),
    };
    Error::StoreUnavailable {
        message,
        fallback: fallback.map(Box::new),
    }
}

//! Conversion Tracker
//!
//! Records a named metric event against an actor's existing assignment.
//! Actors without an assignment (never qualified, experiment unknown) are
//! the common case: their events are dropped, never attributed.

use crate::actor::Actor;
use crate::events::{EventSink, ExperimentEvent, TracingEventSink};
use crate::results::ResultsCache;
use crate::store::{AssignmentStore, ConversionEvent, ConversionStore};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// What happened to a tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Appended to the conversion log
    Recorded,
    /// Dropped: the actor has no assignment in the experiment
    NoAssignment,
}

/// Attributes conversion events to stored assignments.
#[derive(Debug)]
pub struct ConversionTracker<S, E = TracingEventSink> {
    store: Arc<S>,
    sink: Arc<E>,
    results_cache: Option<Arc<ResultsCache>>,
}

impl<S, E> ConversionTracker<S, E>
where
    S: AssignmentStore + ConversionStore,
    E: EventSink,
{
    /// Create a tracker.
    #[must_use]
    pub const fn new(store: Arc<S>, sink: Arc<E>) -> Self {
        Self {
            store,
            sink,
            results_cache: None,
        }
    }

    /// Invalidate cached results on every recorded conversion.
    #[must_use]
    pub fn with_results_cache(mut self, cache: Arc<ResultsCache>) -> Self {
        self.results_cache = Some(cache);
        self
    }

    /// Record `metric` (with an optional value) for the actor's assignment.
    ///
    /// Works for Running, Paused and Completed experiments alike: an
    /// existing assignment stays valid for attribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`](crate::Error::StoreUnavailable)
    /// if the store fails. A missing assignment is not an error.
    pub async fn track_conversion(
        &self,
        experiment_id: &str,
        actor: &Actor,
        metric: &str,
        value: Option<f64>,
    ) -> Result<TrackOutcome> {
        let Some(assignment) = self.store.get_assignment(experiment_id, actor.key()).await? else {
            debug!(experiment_id, actor_key = actor.key(), metric, "conversion dropped: no assignment");
            return Ok(TrackOutcome::NoAssignment);
        };

        let event = ConversionEvent::from_assignment(&assignment, metric, value);
        self.store.record_conversion(event.clone()).await?;
        debug!(
            experiment_id,
            actor_key = actor.key(),
            variant_id = assignment.variant_id(),
            metric,
            "conversion recorded"
        );

        if let Some(cache) = &self.results_cache {
            cache.invalidate(experiment_id);
        }
        self.sink.emit(ExperimentEvent::Conversion(event));
        Ok(TrackOutcome::Recorded)
    }
}

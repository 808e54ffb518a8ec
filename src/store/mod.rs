//! Assignment and conversion storage
//!
//! Provides the persistence seam the engine is built on:
//! - [`AssignmentStore`]: one immutable assignment per (experiment, actor),
//!   written with an atomic create-if-absent primitive
//! - [`ConversionStore`]: append-only conversion event log
//! - In-memory ([`MemoryAssignmentStore`]) and SQLite
//!   ([`SqliteAssignmentStore`], feature `sqlite`) backends
//!
//! # Example
//!
//! ```rust,no_run
//! use splitbench::store::{AssignmentStore, MemoryAssignmentStore};
//!
//! # async fn example() -> splitbench::Result<()> {
//! let store = MemoryAssignmentStore::new();
//!
//! let first = store.create_assignment_if_absent("exp-1", "user-1", "green").await?;
//! let second = store.create_assignment_if_absent("exp-1", "user-1", "control").await?;
//!
//! assert!(first.is_created());
//! assert_eq!(second.assignment().variant_id(), "green");
//! # Ok(())
//! # }
//! ```

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryAssignmentStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAssignmentStore;

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Persisted pairing of an actor to a variant within one experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    experiment_id: String,
    actor_key: String,
    variant_id: String,
    assigned_at: DateTime<Utc>,
}

impl Assignment {
    /// Create an assignment stamped with the current time.
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        actor_key: impl Into<String>,
        variant_id: impl Into<String>,
    ) -> Self {
        Self::at(experiment_id, actor_key, variant_id, Utc::now())
    }

    /// Create an assignment with an explicit timestamp.
    #[must_use]
    pub fn at(
        experiment_id: impl Into<String>,
        actor_key: impl Into<String>,
        variant_id: impl Into<String>,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            actor_key: actor_key.into(),
            variant_id: variant_id.into(),
            assigned_at,
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the actor key.
    #[must_use]
    pub fn actor_key(&self) -> &str {
        &self.actor_key
    }

    /// Get the assigned variant ID.
    #[must_use]
    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    /// Get the assignment timestamp.
    #[must_use]
    pub const fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }
}

/// Result of [`AssignmentStore::create_assignment_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// This call wrote the assignment.
    Created(Assignment),
    /// An assignment already existed; it is returned unchanged.
    Existing(Assignment),
}

impl Insertion {
    /// Whether this call wrote the assignment.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The stored assignment.
    #[must_use]
    pub const fn assignment(&self) -> &Assignment {
        match self {
            Self::Created(a) | Self::Existing(a) => a,
        }
    }

    /// Take the stored assignment.
    #[must_use]
    pub fn into_assignment(self) -> Assignment {
        match self {
            Self::Created(a) | Self::Existing(a) => a,
        }
    }
}

/// Conversion event attributed to an existing assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionEvent {
    experiment_id: String,
    variant_id: String,
    actor_key: String,
    metric: String,
    value: Option<f64>,
    occurred_at: DateTime<Utc>,
}

impl ConversionEvent {
    /// Create a conversion event stamped with the current time.
    #[must_use]
    pub fn new(
        experiment_id: impl Into<String>,
        variant_id: impl Into<String>,
        actor_key: impl Into<String>,
        metric: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant_id: variant_id.into(),
            actor_key: actor_key.into(),
            metric: metric.into(),
            value,
            occurred_at: Utc::now(),
        }
    }

    /// Derive a conversion event from the actor's assignment.
    #[must_use]
    pub fn from_assignment(
        assignment: &Assignment,
        metric: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            experiment_id: assignment.experiment_id.clone(),
            variant_id: assignment.variant_id.clone(),
            actor_key: assignment.actor_key.clone(),
            metric: metric.into(),
            value,
            occurred_at: Utc::now(),
        }
    }

    /// Set a custom timestamp (useful for replay/testing).
    #[must_use]
    pub const fn occurred_at_time(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the variant ID.
    #[must_use]
    pub fn variant_id(&self) -> &str {
        &self.variant_id
    }

    /// Get the actor key.
    #[must_use]
    pub fn actor_key(&self) -> &str {
        &self.actor_key
    }

    /// Get the metric name.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Get the optional metric value.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Get the event timestamp.
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Durable (experiment, actor) -> variant mapping.
///
/// Implementations must make `create_assignment_if_absent` atomic per key
/// (compare-and-set or unique insert), never read-then-write: two
/// concurrent first calls for the same actor must agree on one variant.
pub trait AssignmentStore: Send + Sync {
    /// Get the assignment for an actor, if any.
    fn get_assignment(
        &self,
        experiment_id: &str,
        actor_key: &str,
    ) -> impl Future<Output = Result<Option<Assignment>>> + Send;

    /// Store `variant_id` unless an assignment already exists.
    ///
    /// Returns the assignment that is stored after the call.
    fn create_assignment_if_absent(
        &self,
        experiment_id: &str,
        actor_key: &str,
        variant_id: &str,
    ) -> impl Future<Output = Result<Insertion>> + Send;

    /// All assignments of an experiment.
    fn list_assignments(
        &self,
        experiment_id: &str,
    ) -> impl Future<Output = Result<Vec<Assignment>>> + Send;
}

/// Append-only conversion log.
pub trait ConversionStore: Send + Sync {
    /// Append a conversion event.
    fn record_conversion(&self, event: ConversionEvent) -> impl Future<Output = Result<()>> + Send;

    /// All conversion events of an experiment, oldest first.
    fn list_conversions(
        &self,
        experiment_id: &str,
    ) -> impl Future<Output = Result<Vec<ConversionEvent>>> + Send;
}

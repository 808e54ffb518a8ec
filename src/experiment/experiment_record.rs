//! Experiment Record - definition and lifecycle of an A/B test

use super::{BucketTable, TargetAudience, Variant};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an experiment.
///
/// ```text
/// Draft ──> Running <──> Paused
///              │           │
///              └──> Completed <┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentStatus {
    /// Being defined; editable, not assignable.
    Draft,
    /// Assignable.
    Running,
    /// Temporarily not assignable; assignments are retained.
    Paused,
    /// Terminal; assignments remain valid for attribution.
    Completed,
}

impl ExperimentStatus {
    /// Whether the state machine allows `self -> to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft | Self::Paused, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Running | Self::Paused, Self::Completed)
        )
    }

    /// Get status name as string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics an experiment is judged on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentMetrics {
    /// Metric that decides the winner.
    pub primary: String,
    /// Reported alongside the primary metric.
    #[serde(default)]
    pub secondary: Vec<String>,
}

impl ExperimentMetrics {
    /// Metrics with only a primary metric.
    #[must_use]
    pub fn primary(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Vec::new(),
        }
    }

    /// Add a secondary metric.
    #[must_use]
    pub fn with_secondary(mut self, metric: impl Into<String>) -> Self {
        self.secondary.push(metric.into());
        self
    }
}

/// Experiment definition.
///
/// The first declared variant is the control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experiment {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    status: ExperimentStatus,
    start_date: DateTime<Utc>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    target_audience: TargetAudience,
    variants: Vec<Variant>,
    metrics: ExperimentMetrics,
}

impl Experiment {
    /// Create a builder for a Draft experiment.
    #[must_use]
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get the start date.
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// Get the end date, if scheduled or completed.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Get the target audience.
    #[must_use]
    pub const fn target_audience(&self) -> &TargetAudience {
        &self.target_audience
    }

    /// Get the variants in declaration order.
    #[must_use]
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Get the metrics.
    #[must_use]
    pub const fn metrics(&self) -> &ExperimentMetrics {
        &self.metrics
    }

    /// The control variant (first declared).
    #[must_use]
    pub fn control(&self) -> Option<&Variant> {
        self.variants.first()
    }

    /// Look up a variant by id.
    #[must_use]
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id() == variant_id)
    }

    /// Whether `now` falls inside `[start_date, end_date)`.
    #[must_use]
    pub fn in_schedule(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_date && self.end_date.map_or(true, |end| now < end)
    }

    /// Check the definition invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty id, an invalid variant
    /// list, a percentage outside `0..=100`, contradictory user-type
    /// conditions, a missing primary metric, or an end date before the start.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Configuration("experiment id is empty".to_string()));
        }
        BucketTable::build(&self.variants)?;

        let percentage = self.target_audience.rollout_percentage();
        if !(0.0..=100.0).contains(&percentage) {
            return Err(Error::Configuration(format!(
                "experiment {}: audience percentage {percentage} outside 0..=100",
                self.id
            )));
        }
        if self.target_audience.conditions().is_contradictory() {
            return Err(Error::Configuration(format!(
                "experiment {}: new_user_only and returning_user_only are both set",
                self.id
            )));
        }
        if self.metrics.primary.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "experiment {}: primary metric is empty",
                self.id
            )));
        }
        if let Some(end) = self.end_date {
            if end <= self.start_date {
                return Err(Error::Configuration(format!(
                    "experiment {}: end date precedes start date",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Move to `to`, stamping `end_date` on completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the state machine forbids it;
    /// the record is left unchanged.
    pub fn transition(&mut self, to: ExperimentStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        if to == ExperimentStatus::Completed {
            self.end_date = Some(self.end_date.map_or(now, |end| end.min(now)));
        }
        self.status = to;
        Ok(())
    }

    /// Apply a partial edit. Only Draft experiments are editable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEditable`] outside Draft, or
    /// [`Error::Configuration`] if the edited definition is invalid (the
    /// record is left unchanged).
    pub fn apply(&mut self, patch: ExperimentPatch) -> Result<()> {
        if self.status != ExperimentStatus::Draft {
            return Err(Error::NotEditable {
                id: self.id.clone(),
                status: self.status,
            });
        }

        let mut edited = self.clone();
        if let Some(name) = patch.name {
            edited.name = name;
        }
        if let Some(description) = patch.description {
            edited.description = description;
        }
        if let Some(start_date) = patch.start_date {
            edited.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            edited.end_date = end_date;
        }
        if let Some(target_audience) = patch.target_audience {
            edited.target_audience = target_audience;
        }
        if let Some(variants) = patch.variants {
            edited.variants = variants;
        }
        if let Some(metrics) = patch.metrics {
            edited.metrics = metrics;
        }
        edited.validate()?;

        *self = edited;
        Ok(())
    }
}

/// Partial edit for a Draft experiment. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentPatch {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New start date.
    pub start_date: Option<DateTime<Utc>>,
    /// New end date (`Some(None)` clears it).
    pub end_date: Option<Option<DateTime<Utc>>>,
    /// New audience.
    pub target_audience: Option<TargetAudience>,
    /// New variant list.
    pub variants: Option<Vec<Variant>>,
    /// New metrics.
    pub metrics: Option<ExperimentMetrics>,
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    experiment: Experiment,
}

impl ExperimentBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment: Experiment {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                status: ExperimentStatus::Draft,
                start_date: Utc::now(),
                end_date: None,
                target_audience: TargetAudience::everyone(),
                variants: Vec::new(),
                metrics: ExperimentMetrics::default(),
            },
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.experiment.description = description.into();
        self
    }

    /// Append a variant. The first one added is the control.
    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.experiment.variants.push(variant);
        self
    }

    /// Set the target audience.
    #[must_use]
    pub fn target_audience(mut self, target_audience: TargetAudience) -> Self {
        self.experiment.target_audience = target_audience;
        self
    }

    /// Set the metrics.
    #[must_use]
    pub fn metrics(mut self, metrics: ExperimentMetrics) -> Self {
        self.experiment.metrics = metrics;
        self
    }

    /// Set only the primary metric.
    #[must_use]
    pub fn primary_metric(mut self, metric: impl Into<String>) -> Self {
        self.experiment.metrics.primary = metric.into();
        self
    }

    /// Set a custom start date (useful for scheduling/testing).
    #[must_use]
    pub const fn start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.experiment.start_date = start_date;
        self
    }

    /// Set a scheduled end date.
    #[must_use]
    pub const fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.experiment.end_date = Some(end_date);
        self
    }

    /// Set the status (for restoring stored definitions).
    #[must_use]
    pub const fn status(mut self, status: ExperimentStatus) -> Self {
        self.experiment.status = status;
        self
    }

    /// Build the `Experiment`. Validation happens on registration.
    #[must_use]
    pub fn build(self) -> Experiment {
        self.experiment
    }
}

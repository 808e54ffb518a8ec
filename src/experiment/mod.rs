//! Experiment definitions
//!
//! This module provides the data model for A/B experiments: the
//! definition with its lifecycle, the weighted variants and the audience
//! an experiment targets.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variant (N)  [first = control]
//!      │
//!      ├── TargetAudience { percentage, conditions }
//!      └── ExperimentMetrics { primary, secondary }
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use splitbench::experiment::{Experiment, ExperimentStatus, Variant};
//!
//! let mut experiment = Experiment::builder("hero-cta", "Hero call to action")
//!     .variant(Variant::new("control", 50.0))
//!     .variant(Variant::new("green", 50.0).with_config("color", "green"))
//!     .primary_metric("download")
//!     .build();
//! experiment.validate()?;
//!
//! experiment.transition(ExperimentStatus::Running, chrono::Utc::now())?;
//! # Ok::<(), splitbench::Error>(())
//! ```

mod audience;
mod bucket_table;
mod experiment_record;
mod variant;

pub use audience::{AudienceConditions, TargetAudience};
pub use bucket_table::{BucketTable, WeightError};
pub use experiment_record::{
    Experiment, ExperimentBuilder, ExperimentMetrics, ExperimentPatch, ExperimentStatus,
};
pub use variant::Variant;

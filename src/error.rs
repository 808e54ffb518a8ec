//! Error types for Splitbench
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! "Experiment not running" and "actor ineligible" are not errors: the
//! engine reports them as [`SkipReason`](crate::engine::SkipReason) values
//! and returns `Ok(None)` to callers.

use crate::experiment::{ExperimentStatus, Variant};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Splitbench error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment id unknown to the registry
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Experiment id already registered
    #[error("Experiment already exists: {0}")]
    ExperimentExists(String),

    /// Corrupt or invalid experiment definition (never defaulted to a variant)
    #[error("Configuration error: {0}\nThe experiment definition is invalid and cannot be assigned")]
    Configuration(String),

    /// Lifecycle transition not allowed by the state machine
    #[error("Invalid status transition for experiment {id}: {from} -> {to}")]
    InvalidTransition {
        /// Experiment id
        id: String,
        /// Current status
        from: ExperimentStatus,
        /// Requested status
        to: ExperimentStatus,
    },

    /// Definition edits are only allowed while the experiment is a draft
    #[error("Experiment {id} is {status}; only Draft experiments can be edited")]
    NotEditable {
        /// Experiment id
        id: String,
        /// Current status
        status: ExperimentStatus,
    },

    /// Assignment store read or write failed (retryable)
    ///
    /// `fallback` carries the variant computed for the current request when
    /// one could be determined. It is valid for this request only: the
    /// pairing was not persisted.
    #[error("Assignment store unavailable: {message}")]
    StoreUnavailable {
        /// Store failure description
        message: String,
        /// Variant computed for the current request, if any
        fallback: Option<Box<Variant>>,
    },

    /// Invalid analysis configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a store failure with no computed variant attached.
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            fallback: None,
        }
    }

    /// Whether retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Variant computed for the current request when persistence failed.
    #[must_use]
    pub fn fallback_variant(&self) -> Option<&Variant> {
        match self {
            Self::StoreUnavailable { fallback, .. } => fallback.as_deref(),
            _ => None,
        }
    }
}

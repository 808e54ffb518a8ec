//! Analysis configuration
//!
//! Controls when the results aggregator declares a winner. Values come
//! from code (builder), JSON (serde) or the environment.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`AnalysisConfig::confidence_threshold`].
pub const ENV_CONFIDENCE_THRESHOLD: &str = "SPLITBENCH_CONFIDENCE_THRESHOLD";
/// Environment variable overriding [`AnalysisConfig::min_participants_per_variant`].
pub const ENV_MIN_PARTICIPANTS: &str = "SPLITBENCH_MIN_PARTICIPANTS";

const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.95;
const DEFAULT_MIN_PARTICIPANTS: u64 = 0;

/// Significance settings for the results aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Confidence a variant must exceed to be significant (default 0.95).
    pub confidence_threshold: f64,
    /// Participants required in both control and variant before a
    /// comparison can be significant (default 0, no minimum).
    pub min_participants_per_variant: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            min_participants_per_variant: DEFAULT_MIN_PARTICIPANTS,
        }
    }
}

impl AnalysisConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Defaults overridden by `SPLITBENCH_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a variable does not parse or the
    /// result fails [`AnalysisConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CONFIDENCE_THRESHOLD) {
            config.confidence_threshold = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{ENV_CONFIDENCE_THRESHOLD}={raw} is not a number"))
            })?;
        }
        if let Some(raw) = lookup(ENV_MIN_PARTICIPANTS) {
            config.min_participants_per_variant = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{ENV_MIN_PARTICIPANTS}={raw} is not an integer"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check that the threshold lies strictly inside (0, 1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be in (0, 1), got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for `AnalysisConfig`.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Set the confidence threshold.
    #[must_use]
    pub const fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    /// Set the minimum participants per arm.
    #[must_use]
    pub const fn min_participants_per_variant(mut self, min: u64) -> Self {
        self.config.min_participants_per_variant = min;
        self
    }

    /// Build and validate the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the threshold is out of range.
    pub fn build(self) -> Result<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Target audience - percentage gate and optional condition gates

use crate::actor::Device;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Who an experiment targets.
///
/// `percentage` is in `0..=100`. Conditions left as `None` place no
/// constraint on the actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetAudience {
    percentage: f64,
    #[serde(default)]
    conditions: AudienceConditions,
}

impl TargetAudience {
    /// Audience covering `percentage` percent of actors with no conditions.
    #[must_use]
    pub fn percentage(percentage: f64) -> Self {
        Self {
            percentage,
            conditions: AudienceConditions::default(),
        }
    }

    /// Audience covering every actor.
    #[must_use]
    pub fn everyone() -> Self {
        Self::percentage(100.0)
    }

    /// Replace the condition gates.
    #[must_use]
    pub fn with_conditions(mut self, conditions: AudienceConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Get the percentage gate.
    #[must_use]
    pub const fn rollout_percentage(&self) -> f64 {
        self.percentage
    }

    /// Get the condition gates.
    #[must_use]
    pub const fn conditions(&self) -> &AudienceConditions {
        &self.conditions
    }
}

impl Default for TargetAudience {
    fn default() -> Self {
        Self::everyone()
    }
}

/// Condition gates. Every specified condition must pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudienceConditions {
    /// Required device class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    /// Allowed regions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<BTreeSet<String>>,
    /// Only actors seen for the first time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_user_only: Option<bool>,
    /// Only actors seen before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning_user_only: Option<bool>,
}

impl AudienceConditions {
    /// Require a device class.
    #[must_use]
    pub const fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Restrict to a set of regions.
    #[must_use]
    pub fn locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = Some(locations.into_iter().map(Into::into).collect());
        self
    }

    /// Only new users.
    #[must_use]
    pub const fn new_users_only(mut self) -> Self {
        self.new_user_only = Some(true);
        self
    }

    /// Only returning users.
    #[must_use]
    pub const fn returning_users_only(mut self) -> Self {
        self.returning_user_only = Some(true);
        self
    }

    /// Both user-type gates set, which no actor can satisfy.
    #[must_use]
    pub fn is_contradictory(&self) -> bool {
        self.new_user_only == Some(true) && self.returning_user_only == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_audience_is_everyone() {
        let audience = TargetAudience::default();
        assert!((audience.rollout_percentage() - 100.0).abs() < f64::EPSILON);
        assert_eq!(audience.conditions(), &AudienceConditions::default());
    }

    #[test]
    fn test_contradictory_conditions() {
        let conditions = AudienceConditions::default()
            .new_users_only()
            .returning_users_only();
        assert!(conditions.is_contradictory());
        assert!(!AudienceConditions::default().new_users_only().is_contradictory());
    }

    #[test]
    fn test_conditions_json_shape() {
        let conditions: AudienceConditions = serde_json::from_str(
            r#"{"device":"mobile","locations":["US","CA"],"new_user_only":true}"#,
        )
        .unwrap();
        assert_eq!(conditions.device, Some(Device::Mobile));
        assert_eq!(conditions.locations.as_ref().map(BTreeSet::len), Some(2));
        assert_eq!(conditions.new_user_only, Some(true));
        assert_eq!(conditions.returning_user_only, None);
    }
}

//! Variant - one treatment arm of an experiment

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One treatment arm of an experiment.
///
/// `weight` is relative: a `{50, 50}` pair and a `{1, 1}` pair split traffic
/// identically. `config` is opaque to the engine and interpreted by the
/// caller (e.g. `{"button_color": "green"}`).
///
/// Variants are immutable once their experiment is Running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    id: String,
    weight: f64,
    #[serde(default)]
    config: Map<String, Value>,
}

impl Variant {
    /// Create a variant with an empty config.
    #[must_use]
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            config: Map::new(),
        }
    }

    /// Attach a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Get the variant ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the relative weight.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Get the opaque config map.
    #[must_use]
    pub const fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Look up a single config value.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_config() {
        let variant = Variant::new("green", 50.0).with_config("color", "#00ff00");
        assert_eq!(variant.id(), "green");
        assert!((variant.weight() - 50.0).abs() < f64::EPSILON);
        assert_eq!(
            variant.config_value("color"),
            Some(&Value::String("#00ff00".to_string()))
        );
        assert!(variant.config_value("missing").is_none());
    }

    #[test]
    fn test_variant_deserialize_without_config() {
        let variant: Variant = serde_json::from_str(r#"{"id":"control","weight":1}"#).unwrap();
        assert!(variant.config().is_empty());
    }
}

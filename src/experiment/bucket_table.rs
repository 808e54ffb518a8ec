//! Cumulative-weight table for variant selection
//!
//! Built once when an experiment is activated. Selection maps a bucket in
//! `0..100` to a threshold in `[0, total_weight)` and picks the first
//! variant (in declaration order) whose cumulative boundary is `>=` the
//! threshold.
//!
//! ```text
//! weights:     control=50  green=30  blue=20
//! boundaries:  50          80        100
//! bucket 63 -> threshold 63.0 -> green
//! ```

use super::Variant;
use crate::hash::BUCKETS;
use std::collections::HashSet;
use thiserror::Error;

/// Why a variant list cannot be bucketed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeightError {
    /// No variants declared
    #[error("experiment has no variants")]
    NoVariants,

    /// Weight is zero, negative, NaN or infinite
    #[error("variant {0} has a non-positive or non-finite weight")]
    InvalidWeight(String),

    /// Variant id declared twice
    #[error("duplicate variant id {0}")]
    DuplicateVariant(String),

    /// Weights sum to zero after accumulation
    #[error("total variant weight is zero")]
    ZeroTotal,
}

impl From<WeightError> for crate::Error {
    fn from(err: WeightError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Cumulative weight boundaries, one per variant in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketTable {
    boundaries: Vec<f64>,
    total: f64,
}

impl BucketTable {
    /// Build the table, rejecting malformed variant lists.
    ///
    /// # Errors
    ///
    /// Returns [`WeightError`] if there are no variants, a weight is not a
    /// positive finite number, an id repeats, or the total is zero.
    pub fn build(variants: &[Variant]) -> Result<Self, WeightError> {
        if variants.is_empty() {
            return Err(WeightError::NoVariants);
        }

        let mut seen = HashSet::with_capacity(variants.len());
        let mut boundaries = Vec::with_capacity(variants.len());
        let mut total = 0.0_f64;
        for variant in variants {
            if !seen.insert(variant.id()) {
                return Err(WeightError::DuplicateVariant(variant.id().to_string()));
            }
            let weight = variant.weight();
            if !weight.is_finite() || weight <= 0.0 {
                return Err(WeightError::InvalidWeight(variant.id().to_string()));
            }
            total += weight;
            boundaries.push(total);
        }

        if total <= 0.0 || !total.is_finite() {
            return Err(WeightError::ZeroTotal);
        }

        Ok(Self { boundaries, total })
    }

    /// Sum of all weights.
    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total
    }

    /// Number of variants in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// Always false for a built table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Index of the variant owning `bucket` (taken modulo 100).
    #[must_use]
    pub fn select(&self, bucket: u32) -> usize {
        let threshold = f64::from(bucket % BUCKETS) / f64::from(BUCKETS) * self.total;
        self.boundaries
            .iter()
            .position(|&boundary| boundary >= threshold)
            // Unreachable for threshold < total; guards float drift
            .unwrap_or(self.boundaries.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(weights: &[(&str, f64)]) -> Vec<Variant> {
        weights.iter().map(|(id, w)| Variant::new(*id, *w)).collect()
    }

    #[test]
    fn test_build_boundaries() {
        let table = BucketTable::build(&variants(&[("a", 50.0), ("b", 30.0), ("c", 20.0)])).unwrap();
        assert_eq!(table.len(), 3);
        assert!((table.total_weight() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_select_by_threshold() {
        let table = BucketTable::build(&variants(&[("a", 50.0), ("b", 30.0), ("c", 20.0)])).unwrap();
        assert_eq!(table.select(0), 0);
        assert_eq!(table.select(50), 0); // boundary is inclusive
        assert_eq!(table.select(51), 1);
        assert_eq!(table.select(63), 1);
        assert_eq!(table.select(80), 1);
        assert_eq!(table.select(81), 2);
        assert_eq!(table.select(99), 2);
    }

    #[test]
    fn test_select_scales_relative_weights() {
        let table = BucketTable::build(&variants(&[("a", 1.0), ("b", 3.0)])).unwrap();
        assert_eq!(table.select(25), 0);
        assert_eq!(table.select(26), 1);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(BucketTable::build(&[]), Err(WeightError::NoVariants));
    }

    #[test]
    fn test_rejects_zero_and_nan_weights() {
        assert_eq!(
            BucketTable::build(&variants(&[("a", 1.0), ("b", 0.0)])),
            Err(WeightError::InvalidWeight("b".to_string()))
        );
        assert_eq!(
            BucketTable::build(&variants(&[("a", f64::NAN)])),
            Err(WeightError::InvalidWeight("a".to_string()))
        );
        assert_eq!(
            BucketTable::build(&variants(&[("a", -5.0)])),
            Err(WeightError::InvalidWeight("a".to_string()))
        );
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        assert_eq!(
            BucketTable::build(&variants(&[("a", 1.0), ("a", 1.0)])),
            Err(WeightError::DuplicateVariant("a".to_string()))
        );
    }

    #[test]
    fn test_weight_error_maps_to_configuration() {
        let err: crate::Error = WeightError::ZeroTotal.into();
        assert!(matches!(err, crate::Error::Configuration(_)));
    }
}

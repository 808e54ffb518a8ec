//! Two-proportion z-test
//!
//! Pooled-variance test of `H0: p_variant == p_control`:
//!
//! ```text
//! p  = (x_c + x_v) / (n_c + n_v)
//! se = sqrt(p * (1 - p) * (1/n_c + 1/n_v))
//! z  = (x_v/n_v - x_c/n_c) / se
//! confidence = 2 * Phi(|z|) - 1 = erf(|z| / sqrt(2))
//! ```
//!
//! Confidence is two-sided; direction is read from the sign of `z`.
//! Deterministic for a given set of counts.

use statrs::function::erf::erf;
use std::f64::consts::SQRT_2;

/// Outcome of comparing a variant against control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZTest {
    /// Standard score (positive when the variant converts better).
    pub z: f64,
    /// Two-sided confidence in `[0, 1)`.
    pub confidence: f64,
}

/// Conversion rate, 0.0 when there are no participants.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rate(conversions: u64, participants: u64) -> f64 {
    if participants == 0 {
        0.0
    } else {
        conversions as f64 / participants as f64
    }
}

/// Compare `(conversions, participants)` of a variant against control.
///
/// Returns `z = 0, confidence = 0` when either arm is empty or the pooled
/// rate is 0 or 1 (no variance, no evidence).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn two_proportion_z_test(control: (u64, u64), variant: (u64, u64)) -> ZTest {
    let (x_c, n_c) = control;
    let (x_v, n_v) = variant;
    if n_c == 0 || n_v == 0 {
        return ZTest { z: 0.0, confidence: 0.0 };
    }

    let pooled = (x_c + x_v) as f64 / (n_c + n_v) as f64;
    let variance = pooled * (1.0 - pooled) * (1.0 / n_c as f64 + 1.0 / n_v as f64);
    if variance <= 0.0 {
        return ZTest { z: 0.0, confidence: 0.0 };
    }

    let z = (rate(x_v, n_v) - rate(x_c, n_c)) / variance.sqrt();
    ZTest {
        z,
        confidence: erf(z.abs() / SQRT_2),
    }
}

//! Audience eligibility
//!
//! Pure functions of the experiment definition and the actor; safe to run
//! in parallel without locks.

use crate::actor::Actor;
use crate::experiment::Experiment;
use crate::hash::salted_bucket;
use serde::Serialize;

/// Which gate rejected an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rejection {
    /// Actor's salted bucket is outside the rollout percentage
    Percentage,
    /// Device class mismatch
    Device,
    /// Region missing or not in the allowed set
    Location,
    /// Experiment is for new users only
    NotNewUser,
    /// Experiment is for returning users only
    NotReturningUser,
}

/// Outcome of the eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// All gates passed
    Eligible,
    /// A gate failed
    Ineligible(Rejection),
}

impl Eligibility {
    /// Whether the actor qualifies.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Whether `actor` belongs to the experiment's target audience.
#[must_use]
pub fn is_eligible(experiment: &Experiment, actor: &Actor) -> bool {
    evaluate(experiment, actor).is_eligible()
}

/// Run the percentage gate, then each specified condition gate.
#[must_use]
pub fn evaluate(experiment: &Experiment, actor: &Actor) -> Eligibility {
    let audience = experiment.target_audience();

    let bucket = salted_bucket(actor.key(), experiment.id());
    if f64::from(bucket) >= audience.rollout_percentage() {
        return Eligibility::Ineligible(Rejection::Percentage);
    }

    let conditions = audience.conditions();
    if let Some(device) = conditions.device {
        if device != actor.device() {
            return Eligibility::Ineligible(Rejection::Device);
        }
    }
    if let Some(locations) = &conditions.locations {
        let allowed = actor.region().is_some_and(|region| locations.contains(region));
        if !allowed {
            return Eligibility::Ineligible(Rejection::Location);
        }
    }
    if conditions.new_user_only == Some(true) && !actor.is_new_user() {
        return Eligibility::Ineligible(Rejection::NotNewUser);
    }
    if conditions.returning_user_only == Some(true) && actor.is_new_user() {
        return Eligibility::Ineligible(Rejection::NotReturningUser);
    }

    Eligibility::Eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Device;
    use crate::experiment::{AudienceConditions, TargetAudience, Variant};

    fn experiment(audience: TargetAudience) -> Experiment {
        Experiment::builder("exp-elig", "Eligibility")
            .variant(Variant::new("control", 1.0))
            .primary_metric("download")
            .target_audience(audience)
            .build()
    }

    #[test]
    fn test_everyone_is_eligible_at_100_percent() {
        let experiment = experiment(TargetAudience::everyone());
        for i in 0..500 {
            assert!(is_eligible(&experiment, &Actor::new(format!("u{i}"))));
        }
    }

    #[test]
    fn test_nobody_is_eligible_at_0_percent() {
        let experiment = experiment(TargetAudience::percentage(0.0));
        for i in 0..500 {
            assert_eq!(
                evaluate(&experiment, &Actor::new(format!("u{i}"))),
                Eligibility::Ineligible(Rejection::Percentage)
            );
        }
    }

    #[test]
    fn test_device_gate() {
        let experiment = experiment(
            TargetAudience::everyone()
                .with_conditions(AudienceConditions::default().device(Device::Mobile)),
        );
        assert!(is_eligible(&experiment, &Actor::new("u1").with_device(Device::Mobile)));
        assert_eq!(
            evaluate(&experiment, &Actor::new("u1").with_device(Device::Tablet)),
            Eligibility::Ineligible(Rejection::Device)
        );
    }

    #[test]
    fn test_location_gate_requires_region() {
        let experiment = experiment(
            TargetAudience::everyone()
                .with_conditions(AudienceConditions::default().locations(["US", "CA"])),
        );
        assert!(is_eligible(&experiment, &Actor::new("u1").with_region("CA")));
        assert_eq!(
            evaluate(&experiment, &Actor::new("u1").with_region("FR")),
            Eligibility::Ineligible(Rejection::Location)
        );
        assert_eq!(
            evaluate(&experiment, &Actor::new("u1")),
            Eligibility::Ineligible(Rejection::Location)
        );
    }

    #[test]
    fn test_user_type_gates() {
        let new_only = experiment(
            TargetAudience::everyone().with_conditions(AudienceConditions::default().new_users_only()),
        );
        assert!(is_eligible(&new_only, &Actor::new("u1").new_user(true)));
        assert_eq!(
            evaluate(&new_only, &Actor::new("u1")),
            Eligibility::Ineligible(Rejection::NotNewUser)
        );

        let returning_only = experiment(
            TargetAudience::everyone()
                .with_conditions(AudienceConditions::default().returning_users_only()),
        );
        assert!(is_eligible(&returning_only, &Actor::new("u1")));
        assert_eq!(
            evaluate(&returning_only, &Actor::new("u1").new_user(true)),
            Eligibility::Ineligible(Rejection::NotReturningUser)
        );
    }

    #[test]
    fn test_percentage_gate_is_stable() {
        let experiment = experiment(TargetAudience::percentage(30.0));
        for i in 0..200 {
            let actor = Actor::new(format!("u{i}"));
            let first = is_eligible(&experiment, &actor);
            assert!((0..5).all(|_| is_eligible(&experiment, &actor) == first));
        }
    }
}

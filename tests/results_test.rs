//! Integration tests for results aggregation
//!
//! Results must always reflect the store: cached results are dropped when
//! the engine or tracker writes, and recomputation is deterministic.

use splitbench::actor::Actor;
use splitbench::config::AnalysisConfig;
use splitbench::events::MemoryEventSink;
use splitbench::experiment::{Experiment, ExperimentMetrics, ExperimentStatus, Variant};
use splitbench::results::ResultsAggregator;
use splitbench::store::{AssignmentStore, ConversionEvent, ConversionStore, MemoryAssignmentStore};
use splitbench::{Error, Splitbench};
use std::sync::Arc;

fn service(
    analysis: AnalysisConfig,
) -> Splitbench<MemoryAssignmentStore, MemoryEventSink> {
    let service = Splitbench::builder(
        Arc::new(MemoryAssignmentStore::new()),
        Arc::new(MemoryEventSink::new()),
    )
    .analysis(analysis)
    .build()
    .unwrap();
    service
        .create_experiment(
            Experiment::builder("hero", "Hero banner")
                .variant(Variant::new("control", 50.0))
                .variant(Variant::new("bold", 50.0))
                .metrics(ExperimentMetrics::primary("signup").with_secondary("share"))
                .build(),
        )
        .unwrap();
    service.set_status("hero", ExperimentStatus::Running).unwrap();
    service
}

/// Seed `n` assignments per variant, the first `converters` converting.
async fn seed(store: &MemoryAssignmentStore, variant: &str, n: usize, converters: usize) {
    for i in 0..n {
        let actor_key = format!("{variant}-{i}");
        let insertion = store
            .create_assignment_if_absent("hero", &actor_key, variant)
            .await
            .unwrap();
        if i < converters {
            store
                .record_conversion(ConversionEvent::from_assignment(
                    insertion.assignment(),
                    "signup",
                    None,
                ))
                .await
                .unwrap();
        }
    }
}

// ============================================================================
// Cache invalidation
// ============================================================================

#[tokio::test]
async fn test_results_refresh_after_assignment_and_conversion() {
    let service = service(AnalysisConfig::default());
    let empty = service.get_results("hero").await.unwrap();
    assert_eq!(empty.total_participants(), 0);

    // Cached until something is written
    let again = service.get_results("hero").await.unwrap();
    assert!(Arc::ptr_eq(&empty, &again));

    let actor = Actor::new("u1");
    let variant = service.get_variant("hero", &actor).await.unwrap().unwrap();
    let after_assignment = service.get_results("hero").await.unwrap();
    assert_eq!(after_assignment.total_participants(), 1);
    assert_eq!(after_assignment.variant(variant.id()).unwrap().conversions, 0);

    service
        .track_conversion("hero", &actor, "signup", Some(12.5))
        .await
        .unwrap();
    let after_conversion = service.get_results("hero").await.unwrap();
    let arm = after_conversion.variant(variant.id()).unwrap();
    assert_eq!(arm.conversions, 1);
    assert!((arm.total_value - 12.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_repeat_visit_does_not_invalidate() {
    let service = service(AnalysisConfig::default());
    let actor = Actor::new("u1");
    service.get_variant("hero", &actor).await.unwrap();

    let first = service.get_results("hero").await.unwrap();
    service.get_variant("hero", &actor).await.unwrap();
    let second = service.get_results("hero").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_status_change_refreshes_cached_results() {
    let service = service(AnalysisConfig::default());
    let running = service.get_results("hero").await.unwrap();
    assert_eq!(running.status, ExperimentStatus::Running);

    service.set_status("hero", ExperimentStatus::Paused).unwrap();
    let paused = service.get_results("hero").await.unwrap();
    assert_eq!(paused.status, ExperimentStatus::Paused);
}

#[tokio::test]
async fn test_unknown_experiment() {
    let service = service(AnalysisConfig::default());
    let err = service.get_results("nope").await.unwrap_err();
    assert!(matches!(err, Error::ExperimentNotFound(id) if id == "nope"));
}

// ============================================================================
// Significance
// ============================================================================

#[tokio::test]
async fn test_clear_winner_is_significant() {
    let service = service(AnalysisConfig::default());
    let store = service.engine().store();
    seed(store, "control", 1000, 100).await;
    seed(store, "bold", 1000, 150).await;

    let results = service.aggregator().recompute("hero").await.unwrap();
    assert!(results.statistically_significant);
    assert_eq!(results.winning_variant_id.as_deref(), Some("bold"));

    let bold = results.variant("bold").unwrap();
    assert!(bold.confidence.unwrap() > 0.99);
    assert!((bold.conversion_rate - 0.15).abs() < 1e-12);
    assert!(results.variant("control").unwrap().confidence.is_none());
}

#[tokio::test]
async fn test_small_difference_is_not_significant() {
    let service = service(AnalysisConfig::default());
    let store = service.engine().store();
    seed(store, "control", 500, 50).await;
    seed(store, "bold", 500, 53).await;

    let results = service.get_results("hero").await.unwrap();
    assert!(!results.statistically_significant);
    assert!(results.winning_variant_id.is_none());
    assert!(results.variant("bold").unwrap().confidence.unwrap() < 0.95);
}

#[tokio::test]
async fn test_default_config_has_no_sample_minimum() {
    let service = service(AnalysisConfig::default());
    let store = service.engine().store();
    seed(store, "control", 20, 0).await;
    seed(store, "bold", 20, 20).await;

    let results = service.get_results("hero").await.unwrap();
    assert!(results.variant("bold").unwrap().confidence.unwrap() > 0.99);
    assert!(results.statistically_significant);
    assert_eq!(results.winning_variant_id.as_deref(), Some("bold"));
}

#[tokio::test]
async fn test_min_participants_is_configurable() {
    let strict = AnalysisConfig::builder()
        .min_participants_per_variant(5000)
        .build()
        .unwrap();
    let service = service(strict);
    let store = service.engine().store();
    seed(store, "control", 1000, 100).await;
    seed(store, "bold", 1000, 150).await;

    let results = service.get_results("hero").await.unwrap();
    assert!(!results.statistically_significant);
    assert!(results.variant("bold").unwrap().confidence.unwrap() > 0.99);
}

#[tokio::test]
async fn test_secondary_metrics_and_foreign_events() {
    let service = service(AnalysisConfig::default());
    let actor = Actor::new("u1");
    let variant = service.get_variant("hero", &actor).await.unwrap().unwrap();

    service.track_conversion("hero", &actor, "share", None).await.unwrap();
    service.track_conversion("hero", &actor, "share", None).await.unwrap();
    service.track_conversion("hero", &actor, "scroll", None).await.unwrap();

    let results = service.get_results("hero").await.unwrap();
    let arm = results.variant(variant.id()).unwrap();
    assert_eq!(arm.conversions, 0);
    assert_eq!(arm.secondary_conversions.get("share"), Some(&1));
    assert!(!arm.secondary_conversions.contains_key("scroll"));
}

#[tokio::test]
async fn test_recompute_is_deterministic() {
    let registry = {
        let service = service(AnalysisConfig::default());
        Arc::clone(service.registry())
    };
    let store = Arc::new(MemoryAssignmentStore::new());
    seed(&store, "control", 200, 20).await;
    seed(&store, "bold", 200, 35).await;

    let aggregator = ResultsAggregator::new(registry, store, AnalysisConfig::default());
    let a = aggregator.recompute("hero").await.unwrap();
    let b = aggregator.recompute("hero").await.unwrap();
    assert_eq!(a.variants, b.variants);
    assert_eq!(a.winning_variant_id, b.winning_variant_id);
}

#[test]
fn test_invalid_analysis_config_is_rejected() {
    let err = Splitbench::builder(
        Arc::new(MemoryAssignmentStore::new()),
        Arc::new(MemoryEventSink::new()),
    )
    .analysis(AnalysisConfig {
        confidence_threshold: 1.5,
        ..AnalysisConfig::default()
    })
    .build()
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

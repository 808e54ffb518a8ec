//! Tests for error types

use splitbench::experiment::{ExperimentStatus, Variant, WeightError};
use splitbench::Error;

#[test]
fn test_experiment_not_found_error() {
    let error = Error::ExperimentNotFound("hero".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Experiment not found"));
    assert!(error_str.contains("hero"));
}

#[test]
fn test_experiment_exists_error() {
    let error = Error::ExperimentExists("hero".to_string());
    assert!(format!("{error}").contains("Experiment already exists: hero"));
}

#[test]
fn test_configuration_error() {
    let error = Error::Configuration("variant weights sum to zero".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("variant weights sum to zero"));
    assert!(error_str.contains("cannot be assigned"));
}

#[test]
fn test_invalid_transition_error() {
    let error = Error::InvalidTransition {
        id: "hero".to_string(),
        from: ExperimentStatus::Completed,
        to: ExperimentStatus::Running,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid status transition"));
    assert!(error_str.contains("completed -> running"));
}

#[test]
fn test_not_editable_error() {
    let error = Error::NotEditable {
        id: "hero".to_string(),
        status: ExperimentStatus::Paused,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("hero is paused"));
    assert!(error_str.contains("only Draft experiments can be edited"));
}

#[test]
fn test_store_unavailable_error() {
    let error = Error::store("connection refused");
    let error_str = format!("{error}");
    assert!(error_str.contains("Assignment store unavailable"));
    assert!(error_str.contains("connection refused"));
    assert!(error.is_retryable());
    assert!(error.fallback_variant().is_none());
}

#[test]
fn test_store_unavailable_with_fallback() {
    let error = Error::StoreUnavailable {
        message: "write timeout".to_string(),
        fallback: Some(Box::new(Variant::new("green", 50.0))),
    };
    assert_eq!(error.fallback_variant().map(Variant::id), Some("green"));
}

#[test]
fn test_invalid_config_error() {
    let error = Error::InvalidConfig("confidence_threshold must be in (0, 1)".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid config"));
    assert!(!error.is_retryable());
}

#[test]
fn test_weight_error_converts_to_configuration() {
    let error: Error = WeightError::ZeroTotal.into();
    assert!(matches!(error, Error::Configuration(_)));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_serialization_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("Serialization error"));
}

#[test]
fn test_error_debug_format() {
    let error = Error::ExperimentNotFound("hero".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("ExperimentNotFound"));
}

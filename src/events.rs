//! Event sink boundary
//!
//! The engine emits exposure events (once, at first assignment) and the
//! tracker emits conversion events. Sinks are write-only from the core's
//! point of view: no decision ever reads them back.

use crate::store::ConversionEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One-time signal that an actor was first assigned to a variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExposureEvent {
    /// Experiment id
    pub experiment_id: String,
    /// Assigned variant id
    pub variant_id: String,
    /// Actor key
    pub actor_key: String,
    /// Assignment time
    pub timestamp: DateTime<Utc>,
}

/// Event emitted to analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExperimentEvent {
    /// First assignment of an actor
    Exposure(ExposureEvent),
    /// Conversion attributed to an assignment
    Conversion(ConversionEvent),
}

impl ExperimentEvent {
    /// Experiment the event belongs to.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        match self {
            Self::Exposure(e) => &e.experiment_id,
            Self::Conversion(e) => e.experiment_id(),
        }
    }
}

/// Receives experiment events. Must not block for long: it is called
/// inline on the request path.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: ExperimentEvent);
}

/// Forwards events to `tracing` on target `splitbench::events`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ExperimentEvent) {
        match &event {
            ExperimentEvent::Exposure(e) => info!(
                target: "splitbench::events",
                experiment_id = %e.experiment_id,
                variant_id = %e.variant_id,
                actor_key = %e.actor_key,
                timestamp = %e.timestamp,
                "exposure"
            ),
            ExperimentEvent::Conversion(e) => info!(
                target: "splitbench::events",
                experiment_id = e.experiment_id(),
                variant_id = e.variant_id(),
                actor_key = e.actor_key(),
                metric = e.metric(),
                value = e.value(),
                "conversion"
            ),
        }
    }
}

/// Buffers events in memory (tests, batch exporters).
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ExperimentEvent>>,
}

impl MemoryEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<ExperimentEvent> {
        self.events.lock().clone()
    }

    /// Exposure events received so far.
    #[must_use]
    pub fn exposures(&self) -> Vec<ExposureEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ExperimentEvent::Exposure(x) => Some(x.clone()),
                ExperimentEvent::Conversion(_) => None,
            })
            .collect()
    }

    /// Take and clear the buffer.
    pub fn drain(&self) -> Vec<ExperimentEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: ExperimentEvent) {
        self.events.lock().push(event);
    }
}

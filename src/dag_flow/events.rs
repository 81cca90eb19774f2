//! Event system for task graph runs
//!
//! Provides typed event emission for runtime events

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Runtime event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeEvent {
    TaskPlanned {
        task: String,
        dependencies: Vec<String>,
    },
    TaskStarted {
        task: String,
    },
    TaskCompleted {
        task: String,
        absent: bool,
        duration_ms: u64,
    },
    TaskFailed {
        task: String,
        error: String,
    },
    RunFinished {
        success: bool,
        completed: usize,
    },
}

/// Event envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEventEnvelope {
    pub version: u32,
    pub sequence: u64,
    pub run_id: String,
    pub timestamp: i64,
    pub event: RuntimeEvent,
}

impl RuntimeEventEnvelope {
    pub fn new(run_id: &str, event: RuntimeEvent) -> Self {
        Self {
            version: 1,
            sequence: next_sequence(),
            run_id: run_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}

/// Event sink trait for emitting events
pub trait EventSink: Send + Sync {
    /// Emit an event
    fn emit(&self, envelope: &RuntimeEventEnvelope);
}

/// Writes each event to `tracing` at debug level. Used when no other sink
/// is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, envelope: &RuntimeEventEnvelope) {
        tracing::debug!(
            run_id = %envelope.run_id,
            sequence = envelope.sequence,
            "Event: {:?}",
            envelope.event
        );
    }
}

/// A buffering event sink that collects events
#[derive(Default, Clone)]
pub struct BufferingEventSink {
    events: Arc<RwLock<Vec<RuntimeEventEnvelope>>>,
}

impl BufferingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_events(&self) -> Vec<RuntimeEventEnvelope> {
        self.events.read().clone()
    }

    /// Just the event payloads, in emission order.
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.read().iter().map(|e| e.event.clone()).collect()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for BufferingEventSink {
    fn emit(&self, envelope: &RuntimeEventEnvelope) {
        self.events.write().push(envelope.clone());
    }
}

/// Global sequence counter for events
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Get the next event sequence number
pub fn next_sequence() -> u64 {
    EVENT_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

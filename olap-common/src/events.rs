//! Engine events and EventBus
//!
//! Events are informational. Emission never fails an operation, and a bus
//! with no subscribers silently drops what it is given.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Events broadcast by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OlapEvent {
    CubeCreated {
        cube: String,
        dimensions: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    ComponentAdded {
        dimension: String,
        parent: String,
        child: String,
        timestamp: DateTime<Utc>,
    },

    /// A leaf cell was written through `Put`
    CellWritten {
        cube: String,
        coordinate: Vec<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    },

    /// A cube's rule list was swapped
    RulesReplaced {
        cube: String,
        rule_count: usize,
        timestamp: DateTime<Utc>,
    },

    ProcessStarted {
        name: String,
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    ProcessFinished {
        name: String,
        run_id: Uuid,
        success: bool,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl OlapEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OlapEvent::CubeCreated { .. } => "CubeCreated",
            OlapEvent::ComponentAdded { .. } => "ComponentAdded",
            OlapEvent::CellWritten { .. } => "CellWritten",
            OlapEvent::RulesReplaced { .. } => "RulesReplaced",
            OlapEvent::ProcessStarted { .. } => "ProcessStarted",
            OlapEvent::ProcessFinished { .. } => "ProcessFinished",
        }
    }
}

/// Broadcast distribution of engine events
///
/// Slow subscribers lag and lose old events; they never block producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OlapEvent>,
    capacity: usize,
}

/// Capacity used by `EventBus::default`
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

impl EventBus {
    /// Fails with `Config` for a zero capacity
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config(
                "event bus capacity must be at least 1".to_string(),
            ));
        }
        let (tx, _) = broadcast::channel(capacity);
        Ok(Self { tx, capacity })
    }

    /// Receive all events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<OlapEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: OlapEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!("No subscribers for {}", event.event_type());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            tx,
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

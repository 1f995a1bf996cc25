//! Domain event system: decoupled observation of generation runs.
//!
//! The loop publishes events as it moves through its states. The gateway
//! and CLI subscribe to log them without coupling to the loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A generation run started
    RunStarted {
        run_id: String,
        apis_available: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model returned a usable response
    PlanProduced {
        run_id: String,
        iteration: u32,
        finished: bool,
        timestamp: DateTime<Utc>,
    },

    /// An endpoint was called on the model's behalf
    EndpointCalled {
        run_id: String,
        endpoint: String,
        success: bool,
        status_code: Option<u16>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run reached DONE
    RunFinished {
        run_id: String,
        iterations: u32,
        ceiling_reached: bool,
        timestamp: DateTime<Utc>,
    },

    /// The run reached ABORTED
    RunAborted {
        run_id: String,
        iterations: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Lifecycle event notification
//!
//! Handles subscriptions to container lifecycle events and delivery to
//! subscribers over unbounded channels.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Container lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// A module's declarations were parsed
    ModuleDefined { module: String, services: usize },
    /// A module completed its refresh
    ModuleRefreshed { module: String, singletons: usize },
    /// A module failed and was torn down
    ModuleFailed { module: String, reason: String },
    /// The container was closed
    Closed,
}

/// Event subscription manager
pub struct EventManager {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<LifecycleEvent>>>,
}

impl EventManager {
    /// Create a new event manager
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to all lifecycle events
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Publish an event to every live subscriber
    ///
    /// Subscribers whose receiver has been dropped are removed.
    pub fn publish(&self, event: LifecycleEvent) {
        debug!("Publishing event: {:?}", event);

        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

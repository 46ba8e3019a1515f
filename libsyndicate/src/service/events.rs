//! Event system for publish progress tracking
//!
//! In-process event bus built on `tokio::sync::broadcast`. Services
//! emit events during publish runs; any number of subscribers (CLI
//! progress output, embedding UIs) can listen. Emission never blocks:
//! with no subscribers events are dropped, and lagging subscribers
//! lose the oldest events first.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::Platform;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing publish progress events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the specified per-subscriber buffer
    /// capacity (recommended: 100)
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers (non-blocking)
    pub fn emit(&self, event: Event) {
        // send() errs when nobody is listening, which is fine
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers, for debugging and metrics
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Events emitted during a publish run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A publish run started for a post
    PublishStarted {
        post_id: String,
        /// Channel ids about to be attempted, in order
        channels: Vec<String>,
    },

    /// One target was accepted by its platform
    TargetPublished {
        post_id: String,
        channel_id: String,
        platform: Platform,
        platform_post_id: String,
    },

    /// One target failed (network, auth, payload, timeout)
    TargetFailed {
        post_id: String,
        channel_id: String,
        platform: Platform,
        error: String,
    },

    /// One target was denied by the rate limiter before any network call
    TargetRateLimited {
        post_id: String,
        channel_id: String,
        platform: Platform,
        retry_after_ms: u64,
    },

    /// The publish run finished; `status` is the post's final
    /// aggregate status
    PublishCompleted { post_id: String, status: String },
}

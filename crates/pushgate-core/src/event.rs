//! Routing change notifications.
//!
//! [`crate::router::RouterCenter`] posts a [`RouterChangeEvent`] whenever a
//! registration displaces a live session. Subscribers decide what to do with
//! the displaced session; the server closes local ones and forwards remote
//! ones to the owning node through the queue.

use tokio::sync::broadcast;
use tracing::trace;

use crate::router::Router;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A session was displaced by a newer registration for the same key.
#[derive(Debug, Clone)]
pub struct RouterChangeEvent {
    /// User whose session moved.
    pub user_id: String,
    /// The displaced routing record.
    pub router: Router,
}

/// In-process publish/subscribe channel for [`RouterChangeEvent`]s.
///
/// Cloning yields another handle to the same channel. Slow subscribers lose
/// the oldest events rather than blocking the poster.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RouterChangeEvent>,
}

impl EventBus {
    /// Bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn post(&self, event: RouterChangeEvent) {
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            trace!(user_id = %event.user_id, "router change dropped, no subscribers");
        }
    }

    /// New subscriber receiving events posted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterChangeEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

//! Event types for the Rame event system
//!
//! Provides the shared event definitions and the EventBus used to broadcast
//! scan progress and list changes to in-process listeners and SSE clients.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Rame event types
///
/// Events are broadcast via [`EventBus`] and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ListEvent {
    /// A scan job started for a list
    ScanStarted {
        list_id: String,
        /// Number of items the job will probe
        pending: usize,
    },

    /// One item finished probing
    ItemProbed {
        list_id: String,
        item_id: String,
        /// False when the probe failed and the item stays unresolved
        ok: bool,
    },

    /// A scan job retired
    ScanCompleted {
        list_id: String,
        /// New `refreshed` value of the list
        refreshed: i64,
        probed: usize,
        failed: usize,
    },

    /// A playlist was created
    PlaylistCreated { list_id: String },

    /// A playlist was deleted
    PlaylistDeleted { list_id: String },

    /// Cluster visibility changed; `controller` is None once the info expired
    ClusterChanged { controller: Option<String> },
}

impl ListEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ListEvent::ScanStarted { .. } => "ScanStarted",
            ListEvent::ItemProbed { .. } => "ItemProbed",
            ListEvent::ScanCompleted { .. } => "ScanCompleted",
            ListEvent::PlaylistCreated { .. } => "PlaylistCreated",
            ListEvent::PlaylistDeleted { .. } => "PlaylistDeleted",
            ListEvent::ClusterChanged { .. } => "ClusterChanged",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Cloning is cheap and every
/// clone publishes to the same subscribers.
///
/// # Examples
///
/// ```
/// use rame_common::events::{EventBus, ListEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(ListEvent::PlaylistCreated { list_id: "p1".into() });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ListEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ListEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

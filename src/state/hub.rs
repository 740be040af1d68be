//! Broadcast hub fanning applied mutations out to every connected client.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::ws::ServerMessage;

/// One broadcast unit: the event plus the connection that caused it, so the
/// originator can be skipped when re-publishing.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Connection id of the client whose input produced this event, if any.
    pub origin: Option<Uuid>,
    /// The event payload.
    pub message: ServerMessage,
}

/// Broadcast hub wrapper shared by the WebSocket and SSE fan-out paths.
pub struct EventHub {
    sender: broadcast::Sender<Envelope>,
}

impl EventHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers, ignoring delivery errors
    /// (no subscribers simply means no displays are watching).
    pub fn broadcast(&self, origin: Option<Uuid>, message: ServerMessage) {
        let _ = self.sender.send(Envelope { origin, message });
    }
}

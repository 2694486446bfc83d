use tokio::sync::broadcast;

use crate::protocol::ServerEvent;

/// Fans committed-mutation events out to all connected WebSocket clients.
///
/// The broadcast channel is the explicit registry of live connections: every
/// connection task holds a `Receiver`, and tests can subscribe fake clients
/// without a socket. The coordinator holds no task data itself.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send one event to every connected client, including the originator.
    pub fn broadcast(&self, event: &ServerEvent) {
        // Ignore errors — no subscribers is fine
        let _ = self.tx.send(event.encode());
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

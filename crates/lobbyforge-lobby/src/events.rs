//! Outbound lobby events.
//!
//! Every state change a lobby actor makes produces a [`LobbyEvent`]. The
//! actor hands it to a [`StateBroadcaster`] and moves on; delivery is
//! never awaited and never affects the lifecycle.

use lobbyforge_protocol::LobbyEvent;
use tokio::sync::broadcast;

/// Receives lobby events, fire-and-forget.
pub trait StateBroadcaster: Send + Sync + 'static {
    fn publish(&self, event: LobbyEvent);
}

/// A [`StateBroadcaster`] backed by a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag and lose old events rather than slowing lobbies
/// down.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LobbyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StateBroadcaster for EventBus {
    fn publish(&self, event: LobbyEvent) {
        tracing::trace!(lobby_id = %event.lobby_id(), "publishing lobby event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

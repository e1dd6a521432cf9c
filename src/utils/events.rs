use tokio::sync::broadcast;

use crate::core::ConnectionId;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Every slot is in use or being created.
    Exhausted,
    /// The reused connection had died while idle.
    DeadConnection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    ConnectionCreated { id: ConnectionId },
    ConnectionFailed { reason: String },
    Borrowed { id: ConnectionId },
    Released { id: ConnectionId },
    ConnectionClosed { id: ConnectionId },
    BorrowDeferred { reason: DeferReason },
    ShutDown,
}

/// Fan-out of pool events. Sends never block and are dropped when nobody
/// listens.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { sender }
    }

    pub fn emit(&self, event: PoolEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

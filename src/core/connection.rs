use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::Transport;
use crate::utils::{LogCategory, Logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) type FaultHook = Arc<dyn Fn(ConnectionId) + Send + Sync>;

struct HealthInner {
    alive: AtomicBool,
    on_fault: Mutex<Option<FaultHook>>,
}

/// Shared liveness flag of one connection.
///
/// Handed to the transport as its fault handler; once failed it never
/// recovers. The owner of the connection may hook the first failure to
/// close it right away.
#[derive(Clone)]
pub struct Health {
    id: ConnectionId,
    inner: Arc<HealthInner>,
}

impl Health {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Health {
            id,
            inner: Arc::new(HealthInner {
                alive: AtomicBool::new(true),
                on_fault: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    pub fn fail(&self, reason: &str) {
        if !self.inner.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        Logger::instance().warning(
            LogCategory::Connection,
            &format!("connection {} faulted: {}", self.id, reason),
        );
        let hook = self.inner.on_fault.lock().take();
        if let Some(hook) = hook {
            hook(self.id);
        }
    }

    pub(crate) fn set_fault_hook(&self, hook: FaultHook) {
        *self.inner.on_fault.lock() = Some(hook);
    }

    // Closing is not a fault; the hook must not fire.
    fn retire(&self) {
        self.inner.alive.store(false, Ordering::Release);
        self.inner.on_fault.lock().take();
    }
}

impl fmt::Debug for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Health")
            .field("id", &self.id)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

pub struct Connection<T: Transport> {
    id: ConnectionId,
    health: Health,
    transport: T,
}

impl<T: Transport> Connection<T> {
    pub(crate) fn new(id: ConnectionId, health: Health, transport: T) -> Self {
        Connection { id, health, transport }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_healthy() && self.transport.is_alive()
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Flags the connection as unusable so the pool closes it on release.
    pub fn mark_broken(&self) {
        self.health.fail("marked broken by borrower");
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn close(&mut self) {
        self.health.retire();
        self.transport.close();
    }
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

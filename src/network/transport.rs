use std::io;

use async_trait::async_trait;

use crate::config::{Endpoint, TransportOptions};
use crate::core::Health;
use crate::error::Result;

/// Capabilities the pool needs from a backend connection.
///
/// The pool never speaks the backend protocol itself: it connects,
/// authenticates, asks whether the connection is still usable and closes it.
#[async_trait]
pub trait Transport: Send + Sized + 'static {
    async fn connect(endpoint: &Endpoint, options: &TransportOptions) -> io::Result<Self>;

    /// An empty password must succeed without contacting the backend.
    async fn authenticate(&mut self, password: &str) -> Result<()>;

    fn is_alive(&self) -> bool;

    /// Must be idempotent.
    fn close(&mut self);

    /// Called once after a successful handshake. Implementations that can
    /// observe faults after creation report them through `health` and close
    /// themselves.
    fn watch(&mut self, health: Health) {
        let _ = health;
    }
}

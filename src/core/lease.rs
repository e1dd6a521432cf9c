use std::fmt;
use std::sync::Arc;

use crate::core::connection::{Connection, ConnectionId};
use crate::core::connection_pool::Shared;
use crate::network::{TcpTransport, Transport};

/// A borrower's temporary right to one pooled connection.
///
/// The first [`release`](Lease::release) hands the connection back to the
/// pool and invalidates the lease; later calls do nothing. A lease that is
/// dropped while still valid is released automatically.
pub struct Lease<T: Transport = TcpTransport> {
    pool: Arc<Shared<T>>,
    id: ConnectionId,
    conn: Option<Connection<T>>,
}

impl<T: Transport> Lease<T> {
    pub(crate) fn new(pool: Arc<Shared<T>>, conn: Connection<T>) -> Self {
        Lease {
            pool,
            id: conn.id(),
            conn: Some(conn),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.conn.is_some()
    }

    /// `None` once the lease has been released.
    pub fn connection(&self) -> Option<&Connection<T>> {
        self.conn.as_ref()
    }

    pub fn connection_mut(&mut self) -> Option<&mut Connection<T>> {
        self.conn.as_mut()
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.conn.as_mut().map(Connection::transport_mut)
    }

    pub fn is_alive(&self) -> bool {
        self.conn.as_ref().map_or(false, Connection::is_alive)
    }

    pub fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(conn);
        }
    }
}

impl<T: Transport> Drop for Lease<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Transport> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .finish()
    }
}

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::timeout;

use crate::config::{Endpoint, PoolConfig, TransportOptions};
use crate::core::connection::{Connection, ConnectionId, Health};
use crate::error::{PoolError, Result};
use crate::network::Transport;
use crate::utils::{EventBus, LogCategory, Logger, PoolEvent};

/// Opens and authenticates new backend connections.
pub struct ConnectionFactory<T: Transport> {
    endpoint: Endpoint,
    password: String,
    options: TransportOptions,
    connect_timeout: Duration,
    next_id: AtomicU64,
    events: EventBus,
    _transport: PhantomData<fn() -> T>,
}

impl<T: Transport> ConnectionFactory<T> {
    pub fn new(config: &PoolConfig, events: EventBus) -> Self {
        ConnectionFactory {
            endpoint: config.endpoint(),
            password: config.password.clone(),
            options: config.options.clone(),
            connect_timeout: config.connect_timeout,
            next_id: AtomicU64::new(1),
            events,
            _transport: PhantomData,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn create(&self) -> Result<Connection<T>> {
        let logger = Logger::instance();
        let result = match timeout(self.connect_timeout, self.open()).await {
            Ok(result) => result,
            // The half-open transport is dropped together with the future.
            Err(_) => Err(PoolError::Timeout(self.connect_timeout)),
        };

        match &result {
            Ok(conn) => {
                logger.debug(LogCategory::Connection, &format!("created: {}", conn.id()));
                self.events.emit(PoolEvent::ConnectionCreated { id: conn.id() });
            }
            Err(e) => {
                logger.error(
                    LogCategory::Connection,
                    &format!("failed to connect to {}: {}", self.endpoint, e),
                );
                self.events.emit(PoolEvent::ConnectionFailed { reason: e.to_string() });
            }
        }
        result
    }

    async fn open(&self) -> Result<Connection<T>> {
        let mut transport = T::connect(&self.endpoint, &self.options).await?;

        if let Err(e) = transport.authenticate(&self.password).await {
            transport.close();
            return Err(e);
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let health = Health::new(id);
        transport.watch(health.clone());
        Ok(Connection::new(id, health, transport))
    }
}

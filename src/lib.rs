pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod utils;

pub use config::{Backoff, Endpoint, PoolConfig, TransportOptions};
pub use self::core::{Connection, ConnectionFactory, ConnectionId, Health, Lease, Pool, PoolStatus};
pub use error::{PoolError, Result};
pub use network::{encode_command, TcpTransport, Transport};
pub use utils::{DeferReason, EventBus, LogCategory, LogLevel, Logger, PoolEvent};

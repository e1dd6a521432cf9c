mod connection;
mod factory;
mod lease;
mod connection_pool;

pub use connection::{Connection, ConnectionId, Health};
pub use factory::ConnectionFactory;
pub use lease::Lease;
pub use connection_pool::{Pool, PoolStatus};

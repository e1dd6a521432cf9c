use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Connect error: {0}")]
    Connect(#[from] std::io::Error),
    #[error("Authentication rejected: {0}")]
    Auth(String),
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("Pool is shut down")]
    Closed,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No tokio runtime available to drive the pool")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, PoolError>;

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::error::{PoolError, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay applied before a deferred borrow request is retried.
///
/// Each retry waits `base` plus a uniformly random amount in `[0, jitter)`.
/// A zero `jitter` makes the delay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Backoff { base, jitter }
    }

    pub fn fixed(delay: Duration) -> Self {
        Backoff { base: delay, jitter: Duration::ZERO }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_us = self.jitter.as_micros() as u64;
        if jitter_us == 0 {
            return self.base;
        }
        let extra = rand::thread_rng().gen_range(0..jitter_us);
        self.base + Duration::from_micros(extra)
    }

    /// Longest delay `next_delay` can produce.
    pub fn max_delay(&self) -> Duration {
        self.base + self.jitter
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_millis(225),
            jitter: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Options the pool does not interpret, handed as-is to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOptions {
    values: HashMap<String, String>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parses an option, treating unparsable values as absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub max_connections: usize,
    pub backoff: Backoff,
    /// Upper bound on connect plus authenticate for one new connection.
    pub connect_timeout: Duration,
    pub options: TransportOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            backoff: Backoff::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            options: TransportOptions::new(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from `LEASE_POOL_*` environment variables, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = PoolConfig::default();
        if let Ok(host) = env::var("LEASE_POOL_HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("LEASE_POOL_PORT") {
            config = config.with_port_str(&port)?;
        }
        if let Ok(password) = env::var("LEASE_POOL_PASSWORD") {
            config.password = password;
        }
        if let Ok(max) = env::var("LEASE_POOL_MAX_CONNECTIONS") {
            config.max_connections = max.trim().parse().map_err(|_| {
                PoolError::InvalidConfig(format!("max_connections is not a number: {max:?}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_port_str(mut self, port: &str) -> Result<Self> {
        self.port = port
            .trim()
            .parse()
            .map_err(|_| PoolError::InvalidConfig(format!("port is not a number: {port:?}")))?;
        Ok(self)
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(PoolError::InvalidConfig(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "connect_timeout must be greater than zero".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(PoolError::InvalidConfig("host must not be empty".to_string()));
        }
        Ok(())
    }
}

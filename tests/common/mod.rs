#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lease_pool::{Backoff, Endpoint, Health, PoolConfig, PoolError, Result, Transport, TransportOptions};

pub const BACKOFF: Duration = Duration::from_millis(225);

/// The mock's side of a socket, shared between the transport and the test.
struct MockLink {
    scenario: String,
    alive: AtomicBool,
    closed: AtomicBool,
}

impl MockLink {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            registry().lock().entry(self.scenario.clone()).or_default().closes += 1;
        }
    }
}

/// Per-scenario record of what the mock transport has been asked to do.
#[derive(Default)]
struct Scenario {
    watched: Vec<(Health, Arc<MockLink>)>,
    connects: usize,
    closes: usize,
}

fn registry() -> &'static Mutex<HashMap<String, Scenario>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Scenario>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn healths(scenario: &str) -> Vec<Health> {
    registry()
        .lock()
        .get(scenario)
        .map(|s| s.watched.iter().map(|(health, _)| health.clone()).collect())
        .unwrap_or_default()
}

fn watched(scenario: &str, index: usize) -> (Health, Arc<MockLink>) {
    let registry = registry().lock();
    let (health, link) = registry
        .get(scenario)
        .and_then(|s| s.watched.get(index))
        .expect("no such watched connection");
    (health.clone(), Arc::clone(link))
}

/// The backend drops the `index`th connection and the transport notices:
/// it closes itself and reports the fault.
pub fn report_fault(scenario: &str, index: usize) {
    let (health, link) = watched(scenario, index);
    link.alive.store(false, Ordering::SeqCst);
    link.close();
    health.fail("connection reset by peer");
}

/// The backend drops the `index`th connection without the transport
/// noticing until the pool next looks at it.
pub fn sever(scenario: &str, index: usize) {
    let (_, link) = watched(scenario, index);
    link.alive.store(false, Ordering::SeqCst);
}

pub fn connects(scenario: &str) -> usize {
    registry().lock().get(scenario).map_or(0, |s| s.connects)
}

pub fn closes(scenario: &str) -> usize {
    registry().lock().get(scenario).map_or(0, |s| s.closes)
}

/// In-memory transport driven by `mock.*` options:
/// `mock.scenario` names the registry bucket, `mock.refuse` fails the
/// connect, `mock.password` is the only accepted credential and
/// `mock.connect_delay_ms` stalls the connect.
pub struct MockTransport {
    expected_password: Option<String>,
    link: Arc<MockLink>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(_endpoint: &Endpoint, options: &TransportOptions) -> io::Result<Self> {
        let scenario = options.get("mock.scenario").unwrap_or("default").to_string();

        if let Some(ms) = options.get_parsed::<u64>("mock.connect_delay_ms") {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if options.get_parsed::<bool>("mock.refuse").unwrap_or(false) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }

        registry().lock().entry(scenario.clone()).or_default().connects += 1;
        Ok(MockTransport {
            expected_password: options.get("mock.password").map(str::to_string),
            link: Arc::new(MockLink {
                scenario,
                alive: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            }),
        })
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        match &self.expected_password {
            Some(expected) if expected != password => {
                Err(PoolError::Auth("WRONGPASS invalid password".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn is_alive(&self) -> bool {
        !self.link.closed.load(Ordering::SeqCst) && self.link.alive.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.link.close();
    }

    fn watch(&mut self, health: Health) {
        registry()
            .lock()
            .entry(self.link.scenario.clone())
            .or_default()
            .watched
            .push((health, Arc::clone(&self.link)));
    }
}

pub fn mock_config(scenario: &str, max_connections: usize) -> PoolConfig {
    PoolConfig::default()
        .with_max_connections(max_connections)
        .with_backoff(Backoff::fixed(BACKOFF))
        .with_option("mock.scenario", scenario)
}

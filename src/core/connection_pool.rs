use std::collections::{HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::sleep;

use crate::config::PoolConfig;
use crate::core::connection::{Connection, ConnectionId};
use crate::core::factory::ConnectionFactory;
use crate::core::lease::Lease;
use crate::error::{PoolError, Result};
use crate::network::{TcpTransport, Transport};
use crate::utils::{DeferReason, EventBus, LogCategory, Logger, PoolEvent};

type BorrowCallback<T> = Box<dyn FnOnce(Result<Lease<T>>) + Send + 'static>;

/// One pending acquisition. Resolved exactly once; a deferred request is
/// the same value travelling back through the queue.
struct BorrowRequest<T: Transport> {
    callback: BorrowCallback<T>,
    // Arrival order, kept across retries.
    seq: u64,
    retried: bool,
}

impl<T: Transport> BorrowRequest<T> {
    /// A panicking callback must not take the worker down with it. A lease
    /// it was handed is dropped during unwinding and so released.
    fn resolve(self, result: Result<Lease<T>>) {
        let callback = self.callback;
        if catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
            Logger::instance().error(
                LogCategory::Borrow,
                &format!("borrow callback for request {} panicked", self.seq),
            );
        }
    }
}

enum Command<T: Transport> {
    Submit(BorrowRequest<T>),
    Retry(BorrowRequest<T>),
}

impl<T: Transport> Command<T> {
    fn into_request(self) -> BorrowRequest<T> {
        match self {
            Command::Submit(request) | Command::Retry(request) => request,
        }
    }
}

struct PoolState<T: Transport> {
    // Most recently released last; reuse pops from the back.
    available: Vec<Connection<T>>,
    in_use: HashSet<ConnectionId>,
    creating: usize,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub available: usize,
    pub in_use: usize,
    pub creating: usize,
    pub max_connections: usize,
}

pub(crate) struct Shared<T: Transport> {
    config: PoolConfig,
    state: Mutex<PoolState<T>>,
    factory: ConnectionFactory<T>,
    events: EventBus,
    commands: mpsc::UnboundedSender<Command<T>>,
    next_seq: AtomicU64,
    runtime: Handle,
}

impl<T: Transport> Shared<T> {
    /// Decides the fate of one request. Only ever called from the worker,
    /// so two decisions never interleave.
    fn dispatch(self: &Arc<Self>, request: BorrowRequest<T>) {
        let mut state = self.state.lock();
        Logger::instance().debug(
            LogCategory::Borrow,
            &format!(
                "available: {}, in_use: {}, max_connections: {}",
                state.available.len(),
                state.in_use.len(),
                self.config.max_connections
            ),
        );

        if state.closed {
            drop(state);
            request.resolve(Err(PoolError::Closed));
            return;
        }

        if let Some(conn) = state.available.pop() {
            if conn.is_alive() {
                let id = conn.id();
                state.in_use.insert(id);
                drop(state);
                self.events.emit(PoolEvent::Borrowed { id });
                request.resolve(Ok(Lease::new(Arc::clone(self), conn)));
            } else {
                drop(state);
                self.retire(conn);
                self.defer(request, DeferReason::DeadConnection);
            }
        } else if state.in_use.len() + state.creating < self.config.max_connections {
            state.creating += 1;
            drop(state);
            let shared = Arc::clone(self);
            self.runtime.spawn(async move {
                shared.finish_create(request).await;
            });
        } else {
            drop(state);
            self.defer(request, DeferReason::Exhausted);
        }
    }

    async fn finish_create(self: Arc<Self>, request: BorrowRequest<T>) {
        let result = self.factory.create().await;

        let mut state = self.state.lock();
        state.creating -= 1;
        match result {
            Ok(conn) if state.closed => {
                drop(state);
                self.retire(conn);
                request.resolve(Err(PoolError::Closed));
            }
            Ok(conn) => {
                let id = conn.id();
                state.in_use.insert(id);
                drop(state);
                let pool = Arc::downgrade(&self);
                conn.health().set_fault_hook(Arc::new(move |id| {
                    if let Some(shared) = pool.upgrade() {
                        shared.reap(id);
                    }
                }));
                self.events.emit(PoolEvent::Borrowed { id });
                request.resolve(Ok(Lease::new(Arc::clone(&self), conn)));
            }
            Err(e) => {
                drop(state);
                request.resolve(Err(e));
            }
        }
    }

    /// Puts the request back at the front of the queue once the backoff
    /// delay has passed. The worker moves on immediately.
    fn defer(&self, mut request: BorrowRequest<T>, reason: DeferReason) {
        request.retried = true;
        let delay = self.config.backoff.next_delay();
        Logger::instance().debug(
            LogCategory::Borrow,
            &format!("deferring borrow ({:?}) for {:?}", reason, delay),
        );
        self.events.emit(PoolEvent::BorrowDeferred { reason });

        let commands = self.commands.clone();
        self.runtime.spawn(async move {
            sleep(delay).await;
            if let Err(mpsc::error::SendError(command)) = commands.send(Command::Retry(request)) {
                command.into_request().resolve(Err(PoolError::Closed));
            }
        });
    }

    pub(crate) fn check_in(&self, conn: Connection<T>) {
        let id = conn.id();
        let mut state = self.state.lock();
        let tracked = state.in_use.remove(&id);

        if tracked && !state.closed && conn.is_alive() {
            state.available.push(conn);
            drop(state);
        } else {
            drop(state);
            self.retire(conn);
        }
        self.events.emit(PoolEvent::Released { id });
    }

    /// Closes a faulted connection at once if it sits idle. A leased one is
    /// closed when its lease is released.
    fn reap(&self, id: ConnectionId) {
        let mut state = self.state.lock();
        let Some(pos) = state.available.iter().position(|c| c.id() == id) else {
            return;
        };
        let conn = state.available.remove(pos);
        drop(state);
        self.retire(conn);
    }

    fn retire(&self, mut conn: Connection<T>) {
        conn.close();
        Logger::instance().debug(LogCategory::Connection, &format!("closed: {}", conn.id()));
        self.events.emit(PoolEvent::ConnectionClosed { id: conn.id() });
    }
}

async fn run_worker<T: Transport>(
    pool: Weak<Shared<T>>,
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
) {
    let mut queue: VecDeque<BorrowRequest<T>> = VecDeque::new();

    loop {
        if queue.is_empty() {
            match commands.recv().await {
                Some(command) => enqueue(&mut queue, command),
                None => break,
            }
        }
        while let Ok(command) = commands.try_recv() {
            enqueue(&mut queue, command);
        }

        let Some(request) = queue.pop_front() else {
            continue;
        };
        let Some(shared) = pool.upgrade() else {
            queue.push_front(request);
            break;
        };
        shared.dispatch(request);
    }

    // The pool is gone: nothing can be handed out any more, but every
    // request still owed an answer gets one.
    commands.close();
    while let Ok(command) = commands.try_recv() {
        enqueue(&mut queue, command);
    }
    for request in queue {
        request.resolve(Err(PoolError::Closed));
    }

    Logger::instance().debug(LogCategory::Pool, "borrow worker stopped");
}

/// New requests join the back. A retried request goes back to the front,
/// behind any retried request that arrived before it.
fn enqueue<T: Transport>(queue: &mut VecDeque<BorrowRequest<T>>, command: Command<T>) {
    match command {
        Command::Submit(request) => queue.push_back(request),
        Command::Retry(request) => {
            let pos = queue
                .iter()
                .take_while(|queued| queued.retried && queued.seq < request.seq)
                .count();
            queue.insert(pos, request);
        }
    }
}

/// Bounded pool of connections to a single backend.
///
/// Borrow requests are queued and decided one at a time by a background
/// worker task: reuse the most recently released connection, open a new one
/// while under `max_connections`, or defer the request with a jittered
/// backoff. Only connection failures are ever reported to the borrower.
pub struct Pool<T: Transport = TcpTransport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Pool {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> Pool<T> {
    /// Must be called from within a tokio runtime, which drives the worker.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let events = EventBus::new();
        let factory = ConnectionFactory::new(&config, events.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                available: Vec::new(),
                in_use: HashSet::new(),
                creating: 0,
                closed: false,
            }),
            factory,
            events,
            commands: tx,
            next_seq: AtomicU64::new(0),
            runtime: runtime.clone(),
            config,
        });

        runtime.spawn(run_worker(Arc::downgrade(&shared), rx));
        Logger::instance().info(
            LogCategory::Pool,
            &format!(
                "pool for {} ready, max_connections: {}",
                shared.factory.endpoint(),
                shared.config.max_connections
            ),
        );

        Ok(Pool { shared })
    }

    /// Queues a borrow request; `callback` is invoked exactly once with a
    /// lease or the error that prevented opening a connection. It runs on
    /// the pool's worker task, so it should not block; a panic inside it is
    /// caught and logged.
    pub fn borrow<F>(&self, callback: F)
    where
        F: FnOnce(Result<Lease<T>>) + Send + 'static,
    {
        let request = BorrowRequest {
            callback: Box::new(callback),
            seq: self.shared.next_seq.fetch_add(1, Ordering::Relaxed),
            retried: false,
        };
        if let Err(mpsc::error::SendError(command)) =
            self.shared.commands.send(Command::Submit(request))
        {
            command.into_request().resolve(Err(PoolError::Closed));
        }
    }

    pub async fn acquire(&self) -> Result<Lease<T>> {
        let (tx, rx) = oneshot::channel();
        self.borrow(move |result| {
            // A dropped receiver hands the lease back through its Drop.
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(PoolError::Closed))
    }

    /// Equivalent to `lease.release()`.
    pub fn release(&self, lease: &mut Lease<T>) {
        lease.release();
    }

    /// Opens a connection outside of pool accounting.
    pub fn create<F>(&self, callback: F)
    where
        F: FnOnce(Result<Connection<T>>) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            callback(shared.factory.create().await);
        });
    }

    pub async fn create_connection(&self) -> Result<Connection<T>> {
        self.shared.factory.create().await
    }

    /// Closes idle connections and fails every queued and future borrow
    /// with [`PoolError::Closed`]. Outstanding leases stay usable; their
    /// connections are closed when released.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let idle: Vec<Connection<T>> = state.available.drain(..).collect();
        let in_use = state.in_use.len();
        drop(state);

        for conn in idle {
            self.shared.retire(conn);
        }
        Logger::instance().info(
            LogCategory::Pool,
            &format!("pool shut down, {} connection(s) still leased", in_use),
        );
        self.shared.events.emit(PoolEvent::ShutDown);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            available: state.available.len(),
            in_use: state.in_use.len(),
            creating: state.creating,
            max_connections: self.shared.config.max_connections,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

//! Per-endpoint connection pool.
//!
//! Each pool is owned by a single worker task. Invocations are submitted
//! through an unbounded channel (so submission never blocks and keeps call
//! order), and connection tasks report back through a second channel. All
//! acquisition and release decisions happen inside the worker, which makes
//! it the only place where pool state is mutated.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_core::error::TransportError;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::SendError};
use tracing::{Instrument, debug, trace, warn};

use super::connection::{self, ConnectionId, Sender};
use super::invocation::{InvocationState, Outcome, PendingInvocation};
use super::{PoolKey, PoolStats};
use crate::config::ClientOptions;

#[cfg(feature = "metrics")]
use crate::metrics::{
    CONNECTIONS_CLOSED, CONNECTIONS_FAILED, CONNECTIONS_OPENED, INVOCATIONS_QUEUED,
};

pub(crate) enum PoolCommand {
    Submit(PendingInvocation),
    Shutdown,
}

pub(crate) enum PoolEvent {
    Connected {
        id: ConnectionId,
        result: Result<Sender, TransportError>,
    },
    Finished {
        id: ConnectionId,
        sender: Sender,
        unsent: Option<PendingInvocation>,
    },
    Closed(ConnectionId),
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    open: AtomicUsize,
    peak_open: AtomicUsize,
    connecting: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            open: self.open.load(Ordering::Acquire),
            peak_open: self.peak_open.load(Ordering::Acquire),
            connecting: self.connecting.load(Ordering::Acquire),
            opened: self.opened.load(Ordering::Acquire),
            closed: self.closed.load(Ordering::Acquire),
            queued: self.queued.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }
}

/// Engine-side handle to a pool worker.
#[derive(Clone)]
pub(crate) struct PoolHandle {
    commands: UnboundedSender<PoolCommand>,
    counters: Arc<PoolCounters>,
}

impl PoolHandle {
    pub(crate) fn spawn(key: PoolKey, options: Arc<ClientOptions>, runtime: &Handle) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let counters = Arc::new(PoolCounters::default());
        let worker = PoolWorker {
            capacity: options.connection_capacity(),
            key,
            options,
            connections: HashMap::new(),
            connecting: 0,
            connect_failed: false,
            queue: VecDeque::new(),
            next_id: 1,
            commands,
            events,
            events_tx,
            counters: Arc::clone(&counters),
        };
        runtime.spawn(worker.run());
        Self {
            commands: commands_tx,
            counters,
        }
    }

    /// Enqueues `invocation`, failing it if the worker is gone.
    pub(crate) fn submit(&self, invocation: PendingInvocation) {
        if let Err(SendError(PoolCommand::Submit(invocation))) =
            self.commands.send(PoolCommand::Submit(invocation))
        {
            invocation.fail(TransportError::PoolClosed);
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.commands.send(PoolCommand::Shutdown);
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }
}

struct PooledConnection {
    /// `None` while an HTTP/1.1 connection is leased to an invocation.
    sender: Option<Sender>,
    in_flight: usize,
}

impl PooledConnection {
    fn is_closed(&self) -> bool {
        self.sender.as_ref().is_some_and(Sender::is_closed)
    }
}

struct PoolWorker {
    key: PoolKey,
    options: Arc<ClientOptions>,
    capacity: usize,
    connections: HashMap<ConnectionId, PooledConnection>,
    connecting: usize,
    /// Last connect attempt failed; no new attempts while open connections
    /// can still drain the queue.
    connect_failed: bool,
    queue: VecDeque<PendingInvocation>,
    next_id: u64,
    commands: UnboundedReceiver<PoolCommand>,
    events: UnboundedReceiver<PoolEvent>,
    events_tx: UnboundedSender<PoolEvent>,
    counters: Arc<PoolCounters>,
}

impl PoolWorker {
    async fn run(mut self) {
        debug!(pool = %self.key, max_pool_size = self.options.max_pool_size, "pool started");
        loop {
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => self.on_event(event),
                command = self.commands.recv() => match command {
                    Some(PoolCommand::Submit(invocation)) => {
                        debug_assert_eq!(invocation.state(), InvocationState::Created);
                        self.queue.push_back(invocation);
                    }
                    Some(PoolCommand::Shutdown) | None => break,
                },
            }
            self.dispatch();
        }
        self.close();
    }

    fn on_event(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::Connected { id, result } => {
                self.connecting -= 1;
                match result {
                    Ok(sender) => {
                        self.connect_failed = false;
                        debug!(pool = %self.key, connection = %id, "connection opened");
                        self.connections.insert(
                            id,
                            PooledConnection {
                                sender: Some(sender),
                                in_flight: 0,
                            },
                        );
                        self.counters.opened.fetch_add(1, Ordering::AcqRel);
                        #[cfg(feature = "metrics")]
                        metrics::counter!(*CONNECTIONS_OPENED, "pool" => self.key.to_string())
                            .increment(1);
                    }
                    Err(error) => {
                        warn!(pool = %self.key, connection = %id, %error, "connection failed");
                        #[cfg(feature = "metrics")]
                        metrics::counter!(*CONNECTIONS_FAILED, "pool" => self.key.to_string())
                            .increment(1);
                        self.connect_failed = true;
                        // Waiters keep their place while a live connection can serve them.
                        if self.connections.is_empty()
                            && let Some(invocation) = self.queue.pop_front()
                        {
                            invocation.fail(error);
                        }
                    }
                }
            }
            PoolEvent::Finished { id, sender, unsent } => {
                self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
                let closed = sender.is_closed();
                if let Some(connection) = self.connections.get_mut(&id) {
                    connection.in_flight -= 1;
                    if !closed && connection.sender.is_none() {
                        trace!(pool = %self.key, connection = %id, "connection released");
                        connection.sender = Some(sender);
                    }
                }
                if closed {
                    self.remove(id);
                }
                if let Some(invocation) = unsent {
                    self.queue.push_front(invocation);
                }
            }
            PoolEvent::Closed(id) => self.remove(id),
        }
    }

    /// Assigns queued invocations to available connections and opens new
    /// connections for the remaining demand, within the pool bound.
    fn dispatch(&mut self) {
        self.evict_closed();

        while !self.queue.is_empty() {
            let Some(id) = self.available() else {
                break;
            };
            let Some(invocation) = self.queue.pop_front() else {
                break;
            };
            self.assign(id, invocation);
        }

        let needed = if self.connect_failed && !self.connections.is_empty() {
            0
        } else {
            self.queue.len().div_ceil(self.capacity)
        };
        while self.connecting < needed
            && self.connections.len() + self.connecting < self.options.max_pool_size
        {
            self.open();
        }

        self.publish();
    }

    /// The least loaded connection that can take another request.
    fn available(&self) -> Option<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, connection)| {
                connection.in_flight < self.capacity
                    && connection
                        .sender
                        .as_ref()
                        .is_some_and(|sender| !sender.is_closed())
            })
            .min_by_key(|(id, connection)| (connection.in_flight, **id))
            .map(|(id, _)| *id)
    }

    fn assign(&mut self, id: ConnectionId, mut invocation: PendingInvocation) {
        let Some(connection) = self.connections.get_mut(&id) else {
            self.queue.push_front(invocation);
            return;
        };
        let sender = match connection.sender.as_ref().and_then(Sender::share) {
            Some(shared) => shared,
            None => match connection.sender.take() {
                Some(sender) => sender,
                None => {
                    self.queue.push_front(invocation);
                    return;
                }
            },
        };
        connection.in_flight += 1;
        self.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        trace!(pool = %self.key, connection = %id, "connection acquired");
        invocation.acquired(id);

        let events = self.events_tx.clone();
        let span = invocation.span().clone();
        tokio::spawn(
            async move {
                let (sender, outcome) = invocation.run(sender).await;
                match outcome {
                    Outcome::Resolved(resolution) => {
                        // A caller awaiting this response may submit its next
                        // request right away; the worker must see the release first.
                        let _ = events.send(PoolEvent::Finished {
                            id,
                            sender,
                            unsent: None,
                        });
                        resolution.deliver();
                    }
                    Outcome::Unsent(invocation) => {
                        let _ = events.send(PoolEvent::Finished {
                            id,
                            sender,
                            unsent: Some(invocation),
                        });
                    }
                }
            }
            .instrument(span),
        );
    }

    fn open(&mut self) {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        self.connecting += 1;

        let key = self.key.clone();
        let options = Arc::clone(&self.options);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = connection::connect(key, id, &options, events.clone()).await;
            let _ = events.send(PoolEvent::Connected { id, result });
        });
    }

    fn evict_closed(&mut self) {
        let closed: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for id in closed {
            self.remove(id);
        }
    }

    fn remove(&mut self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            debug!(pool = %self.key, connection = %id, "connection closed");
            self.counters.closed.fetch_add(1, Ordering::AcqRel);
            #[cfg(feature = "metrics")]
            metrics::counter!(*CONNECTIONS_CLOSED, "pool" => self.key.to_string()).increment(1);
        }
    }

    fn publish(&self) {
        let open = self.connections.len();
        self.counters.open.store(open, Ordering::Release);
        self.counters.peak_open.fetch_max(open, Ordering::AcqRel);
        self.counters
            .connecting
            .store(self.connecting, Ordering::Release);
        self.counters
            .queued
            .store(self.queue.len(), Ordering::Release);
        #[cfg(feature = "metrics")]
        metrics::gauge!(*INVOCATIONS_QUEUED, "pool" => self.key.to_string())
            .set(self.queue.len() as f64);
    }

    fn close(&mut self) {
        debug!(pool = %self.key, queued = self.queue.len(), "pool closing");
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let PoolCommand::Submit(invocation) = command {
                self.queue.push_back(invocation);
            }
        }
        for invocation in self.queue.drain(..) {
            invocation.fail(TransportError::PoolClosed);
        }
        // Leased connections finish their current request; idle ones close here.
        self.connections.clear();
        self.publish();
    }
}

//! Async driver that owns one connection lifecycle.
//!
//! [`Client::run`] negotiates a session, opens the websocket and then
//! multiplexes socket activity, handle commands and the heartbeat and
//! liveness timers until the lifecycle reaches a terminal state.

use std::sync::Arc;
use std::time::Instant;

use protocol::{
    handshake, ActionSink, ConnectionError, ConnectionId, ConnectionLifecycle, ConnectionState,
    Event, HandshakeExchange, LifecycleObserver, TracingObserver, TransportFailure,
};
use tokio::sync::mpsc;
use tracing::{debug, info_span, warn, Instrument as _};

use crate::ws::{TransportEvent, WebSocketTransport};
use crate::{ClientConfig, ConnectorError, HttpHandshake};

#[derive(Debug)]
enum Command {
    Send(Event),
    Close,
}

/// Cloneable control handle for a running [`Client`].
///
/// Both operations are synchronous, so an [`ActionSink`] may call them from
/// inside `submit`.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ClientHandle {
    /// Requests an orderly close. Repeated calls are harmless.
    pub fn close(&self) {
        // A stopped client is already closed.
        let _ = self.commands.send(Command::Close);
    }

    /// Queues an outbound event. Events sent before the connection opens are
    /// delivered once it does.
    pub fn send(&self, event: Event) -> Result<(), ConnectorError> {
        self.commands
            .send(Command::Send(event))
            .map_err(|_| ConnectorError::ClientStopped)
    }
}

/// How a client run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOutcome {
    /// Id of the lifecycle instance that ran.
    pub connection_id: ConnectionId,
    /// `Closed` or `Failed`.
    pub state: ConnectionState,
    /// The error attached to `Failed`.
    pub error: Option<ConnectionError>,
}

impl ClientOutcome {
    /// `Ok` for an orderly close, the terminal error otherwise.
    pub fn into_result(self) -> Result<(), ConnectionError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// One connection attempt against a configured host.
pub struct Client {
    config: ClientConfig,
    exchange: Arc<dyn HandshakeExchange>,
    observer: Arc<dyn LifecycleObserver>,
    sink: Arc<dyn ActionSink>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client that negotiates over HTTP and logs through
    /// [`TracingObserver`].
    pub fn new(config: ClientConfig, sink: Arc<dyn ActionSink>) -> Result<Self, ConnectorError> {
        let exchange = HttpHandshake::new(config.handshake_timeout())?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            exchange: Arc::new(exchange),
            observer: Arc::new(TracingObserver),
            sink,
            commands_tx,
            commands_rx,
        })
    }

    /// Replaces the handshake exchange.
    pub fn with_exchange(mut self, exchange: Arc<dyn HandshakeExchange>) -> Self {
        self.exchange = exchange;
        self
    }

    /// Replaces the lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// A handle for closing or sending from other tasks. Usable before
    /// [`run`](Self::run) starts.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Drives the connection until it is `Closed` or `Failed`.
    pub async fn run(self) -> ClientOutcome {
        let Self {
            config,
            exchange,
            observer,
            sink,
            commands_tx,
            commands_rx,
        } = self;
        // Only handles keep the command channel open from here on.
        drop(commands_tx);

        let (transport, events) = WebSocketTransport::new();
        let lifecycle = ConnectionLifecycle::new(
            config.host.clone(),
            config.resolver(),
            config.lifecycle(),
            transport,
            observer,
        );
        let span = info_span!(
            "connection",
            connection_id = %lifecycle.id(),
            host = %lifecycle.host()
        );
        Driver {
            lifecycle,
            events,
            commands: commands_rx,
            commands_open: true,
            pending: Vec::new(),
        }
        .run(exchange.as_ref(), sink.as_ref())
        .instrument(span)
        .await
    }
}

struct Driver {
    lifecycle: ConnectionLifecycle<WebSocketTransport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    /// Outbound events waiting for the connection to open.
    pending: Vec<Event>,
}

impl Driver {
    async fn run(mut self, exchange: &dyn HandshakeExchange, sink: &dyn ActionSink) -> ClientOutcome {
        self.handshake(exchange).await;

        while !self.lifecycle.state().is_terminal() {
            let heartbeat_at = self.lifecycle.next_heartbeat_at();
            let deadline = self.lifecycle.liveness_deadline();

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.on_transport_event(event, sink),
                    None => self
                        .lifecycle
                        .on_fail(TransportFailure::new("transport event channel closed")),
                },
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("All client handles dropped");
                        self.commands_open = false;
                    }
                },
                _ = sleep_until(heartbeat_at) => self.lifecycle.on_heartbeat_due(now()),
                _ = sleep_until(deadline) => self.lifecycle.check_liveness(now()),
            }
        }

        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Discarding unsent events");
        }
        ClientOutcome {
            connection_id: self.lifecycle.id(),
            state: self.lifecycle.state(),
            error: self.lifecycle.failure().cloned(),
        }
    }

    /// Negotiates the session, giving up early if a close arrives first.
    async fn handshake(&mut self, exchange: &dyn HandshakeExchange) {
        let Some(endpoint) = self.lifecycle.begin_handshake() else {
            return;
        };
        let result = tokio::select! {
            result = handshake::negotiate(exchange, &endpoint) => Some(result),
            _ = wait_for_close(&mut self.commands, &mut self.pending) => None,
        };
        match result {
            Some(result) => self.lifecycle.complete_handshake(result, now()),
            None => self.lifecycle.close(),
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent, sink: &dyn ActionSink) {
        match event {
            TransportEvent::Opened => {
                self.lifecycle.on_open(now());
                if self.lifecycle.state() == ConnectionState::Open {
                    for event in std::mem::take(&mut self.pending) {
                        self.send(event);
                    }
                }
            }
            TransportEvent::Message(text) => self.lifecycle.on_message(&text, now(), sink),
            TransportEvent::Binary(bytes) => self.lifecycle.on_binary(&bytes, now(), sink),
            TransportEvent::Closed => self.lifecycle.on_close(),
            TransportEvent::Failed(reason) => self.lifecycle.on_fail(TransportFailure::new(reason)),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Close => self.lifecycle.close(),
            Command::Send(event) => match self.lifecycle.state() {
                ConnectionState::Open => self.send(event),
                ConnectionState::Idle | ConnectionState::Handshaking | ConnectionState::Connecting => {
                    self.pending.push(event)
                }
                state => debug!(%state, frame = event.type_name(), "Dropping outbound event"),
            },
        }
    }

    fn send(&mut self, event: Event) {
        if let Err(error) = self.lifecycle.send(&event) {
            warn!(frame = event.type_name(), error = %error, "Failed to send event");
        }
    }
}

/// Resolves on the first close command; sends seen meanwhile are queued.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>, pending: &mut Vec<Event>) {
    loop {
        match commands.recv().await {
            Some(Command::Close) => return,
            Some(Command::Send(event)) => pending.push(event),
            None => std::future::pending::<()>().await,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending::<()>().await,
    }
}

/// Current time from tokio's clock, so paused-time tests control it.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

//! Connection lifecycle state machine.
//!
//! ```text
//! Idle ──start──▶ Handshaking ──ok──▶ Connecting ──open──▶ Open ──close──▶ Closing ──closed──▶ Closed
//!                      │                   │                 │
//!                      └──error──▶ Failed ◀┴──fail/timeout───┘
//! ```
//!
//! The transport's four callbacks map onto [`ConnectionLifecycle::on_open`],
//! [`ConnectionLifecycle::on_message`], [`ConnectionLifecycle::on_close`] and
//! [`ConnectionLifecycle::on_fail`]. An adapter at the system boundary invokes
//! them; nothing here knows how the transport is implemented.
//!
//! The state machine never reads a monotonic clock. Callers pass `now` into
//! every time-dependent transition and poll [`ConnectionLifecycle::next_heartbeat_at`]
//! and [`ConnectionLifecycle::liveness_deadline`] to schedule timers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::frame::{self, Event};
use crate::handshake::{self, HandshakeExchange};
use crate::{
    dispatch, ActionSink, ConnectionEndpoint, ConnectionError, ConnectionId, ConnectionState,
    EndpointResolver, FrameDecodeError, FrameErrorKind, HandshakeError, LifecycleObserver,
    SendError, SessionDescriptor, Timestamp, Transition, TransportFailure,
};

/// Request side of the underlying bidirectional transport.
///
/// Calls must not block: results of `connect` and `close` arrive later through
/// the lifecycle callbacks.
pub trait Transport: Send {
    /// Starts connecting to `endpoint`. An `Err` means the attempt could not
    /// even be started.
    fn connect(&mut self, endpoint: &ConnectionEndpoint) -> Result<(), TransportFailure>;

    /// Sends one text frame.
    fn send(&mut self, payload: &str) -> Result<(), TransportFailure>;

    /// Starts closing the connection.
    fn close(&mut self);
}

/// Tunables for a lifecycle instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Interval between outbound heartbeats. `None` derives it as half the
    /// negotiated heartbeat timeout.
    pub heartbeat_interval: Option<Duration>,
    /// Answer every incoming heartbeat with one of our own.
    pub echo_heartbeats: bool,
    /// Acknowledge message frames whose id asks for a plain ack.
    pub auto_ack: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: None,
            echo_heartbeats: true,
            auto_ack: true,
        }
    }
}

/// Owns the connection state and session descriptor for one connection
/// attempt.
///
/// `Closed` and `Failed` are terminal: reconnecting means building a new
/// instance, which negotiates a new session.
pub struct ConnectionLifecycle<T: Transport> {
    id: ConnectionId,
    host: String,
    resolver: EndpointResolver,
    config: LifecycleConfig,
    transport: T,
    observer: Arc<dyn LifecycleObserver>,
    state: ConnectionState,
    session: Option<SessionDescriptor>,
    endpoint: Option<ConnectionEndpoint>,
    failure: Option<ConnectionError>,
    connecting_since: Option<Instant>,
    last_heartbeat_in: Option<Instant>,
    last_heartbeat_out: Option<Instant>,
    connect_issued: bool,
    close_sent: bool,
}

impl<T: Transport> std::fmt::Debug for ConnectionLifecycle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("state", &self.state)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ConnectionLifecycle<T> {
    /// Creates an idle lifecycle for `host`.
    pub fn new(
        host: impl Into<String>,
        resolver: EndpointResolver,
        config: LifecycleConfig,
        transport: T,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            id: ConnectionId::new_random(),
            host: host.into(),
            resolver,
            config,
            transport,
            observer,
            state: ConnectionState::Idle,
            session: None,
            endpoint: None,
            failure: None,
            connecting_since: None,
            last_heartbeat_in: None,
            last_heartbeat_out: None,
            connect_issued: false,
            close_sent: false,
        }
    }

    /// Correlation id of this instance.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Host this instance connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The live session descriptor; `None` before the handshake and after
    /// teardown.
    pub fn session(&self) -> Option<&SessionDescriptor> {
        self.session.as_ref()
    }

    /// The upgrade endpoint computed from the last successful handshake.
    pub fn endpoint(&self) -> Option<&ConnectionEndpoint> {
        self.endpoint.as_ref()
    }

    /// The error that moved this instance to `Failed`.
    pub fn failure(&self) -> Option<&ConnectionError> {
        self.failure.as_ref()
    }

    /// The transport, for inspection.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Runs the whole `Idle → Handshaking → Connecting` sequence against
    /// `exchange`.
    ///
    /// Drivers that need to cancel a slow handshake use
    /// [`begin_handshake`](Self::begin_handshake) and
    /// [`complete_handshake`](Self::complete_handshake) directly. `clock` is
    /// read once the negotiation returns.
    pub async fn start(
        &mut self,
        exchange: &dyn HandshakeExchange,
        clock: impl FnOnce() -> Instant,
    ) {
        let Some(endpoint) = self.begin_handshake() else {
            return;
        };
        let result = handshake::negotiate(exchange, &endpoint).await;
        self.complete_handshake(result, clock());
    }

    /// Moves `Idle → Handshaking` and returns the negotiation endpoint.
    ///
    /// Returns `None` when not idle, or when the host cannot be resolved (the
    /// instance is then `Failed`).
    pub fn begin_handshake(&mut self) -> Option<ConnectionEndpoint> {
        if self.state != ConnectionState::Idle {
            warn!(connection_id = %self.id, state = %self.state, "Handshake requested outside idle state");
            return None;
        }
        match self.resolver.resolve(&self.host, None) {
            Ok(endpoint) => {
                self.session = None;
                self.endpoint = None;
                self.transition(ConnectionState::Handshaking, None);
                Some(endpoint)
            }
            Err(error) => {
                self.fail(error.into());
                None
            }
        }
    }

    /// Applies the negotiation result: on success stores the new session and
    /// asks the transport to connect to the upgrade endpoint.
    ///
    /// Ignored unless the instance is still `Handshaking` (a close may have
    /// arrived while the request was in flight).
    pub fn complete_handshake(
        &mut self,
        result: Result<SessionDescriptor, HandshakeError>,
        now: Instant,
    ) {
        if self.state != ConnectionState::Handshaking {
            debug!(connection_id = %self.id, state = %self.state, "Ignoring late handshake result");
            return;
        }
        let descriptor = match result {
            Ok(descriptor) => descriptor,
            Err(error) => return self.fail(error.into()),
        };
        let endpoint = match self.resolver.resolve(&self.host, Some(descriptor.session_id())) {
            Ok(endpoint) => endpoint,
            Err(error) => return self.fail(error.into()),
        };

        debug!(
            connection_id = %self.id,
            session_id = %descriptor.session_id(),
            endpoint = %endpoint,
            "Session negotiated"
        );
        self.session = Some(descriptor);
        self.endpoint = Some(endpoint.clone());
        self.connecting_since = Some(now);
        self.transition(ConnectionState::Connecting, None);

        self.connect_issued = true;
        if let Err(failure) = self.transport.connect(&endpoint) {
            self.fail(failure.into());
        }
    }

    // -----------------------------------------------------------------------
    // Transport callbacks
    // -----------------------------------------------------------------------

    /// Transport open callback.
    pub fn on_open(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Connecting => {
                self.last_heartbeat_in = Some(now);
                self.last_heartbeat_out = Some(now);
                self.transition(ConnectionState::Open, None);
            }
            state => debug!(connection_id = %self.id, state = %state, "Ignoring open callback"),
        }
    }

    /// Transport message callback: decodes and dispatches one payload.
    ///
    /// Undecodable frames and sink failures are reported to the observer; the
    /// state stays `Open`.
    pub fn on_message(&mut self, payload: &str, now: Instant, sink: &dyn ActionSink) {
        if self.state != ConnectionState::Open {
            debug!(connection_id = %self.id, state = %self.state, "Dropping frame received outside open state");
            return;
        }
        trace!(connection_id = %self.id, payload, "Frame received");
        match frame::decode(payload) {
            Ok(event) => {
                if let Err(error) = dispatch::dispatch(event, self, sink, now) {
                    self.observer.on_sink_error(self.id, &error);
                }
            }
            Err(error) => self.observer.on_frame_error(self.id, &error),
        }
    }

    /// Binary variant of the message callback. Payloads that are not UTF-8
    /// are reported as frame errors.
    pub fn on_binary(&mut self, payload: &[u8], now: Instant, sink: &dyn ActionSink) {
        match std::str::from_utf8(payload) {
            Ok(text) => self.on_message(text, now, sink),
            Err(_) if self.state == ConnectionState::Open => {
                let error = FrameDecodeError {
                    raw: String::from_utf8_lossy(payload).into_owned(),
                    kind: FrameErrorKind::InvalidUtf8,
                };
                self.observer.on_frame_error(self.id, &error);
            }
            Err(_) => {}
        }
    }

    /// Transport close callback.
    pub fn on_close(&mut self) {
        match self.state {
            ConnectionState::Closing | ConnectionState::Open => {
                self.close_sent = true;
                self.transition(ConnectionState::Closed, None);
            }
            ConnectionState::Connecting => {
                self.close_sent = true;
                self.fail(TransportFailure::new("transport closed before opening").into());
            }
            state => debug!(connection_id = %self.id, state = %state, "Ignoring close callback"),
        }
    }

    /// Transport failure callback. Always fatal for a live instance.
    pub fn on_fail(&mut self, failure: TransportFailure) {
        self.close_sent = true;
        self.fail(failure.into());
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Requests an orderly close. Safe from any state; a no-op once closing or
    /// terminal, and the transport is asked to close at most once.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Idle | ConnectionState::Handshaking => {
                self.transition(ConnectionState::Closed, None);
            }
            ConnectionState::Connecting | ConnectionState::Open => {
                self.transition(ConnectionState::Closing, None);
                self.close_transport();
            }
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed => {
                debug!(connection_id = %self.id, state = %self.state, "Close already requested");
            }
        }
    }

    /// Encodes and sends an outbound event.
    pub fn send(&mut self, event: &Event) -> Result<(), SendError> {
        if self.state != ConnectionState::Open {
            return Err(SendError::NotOpen { state: self.state });
        }
        let payload = frame::encode(event);
        trace!(connection_id = %self.id, payload = %payload, "Frame sent");
        self.transport.send(&payload)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Interval between outbound heartbeats, if any are scheduled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.config
            .heartbeat_interval
            .or_else(|| {
                self.session
                    .as_ref()
                    .and_then(SessionDescriptor::heartbeat_timeout)
                    .map(|timeout| timeout / 2)
            })
            .filter(|interval| !interval.is_zero())
    }

    /// When the next outbound heartbeat is due. `None` unless `Open`.
    pub fn next_heartbeat_at(&self) -> Option<Instant> {
        if self.state != ConnectionState::Open {
            return None;
        }
        self.last_heartbeat_out?
            .checked_add(self.heartbeat_interval()?)
    }

    /// Emits an outbound heartbeat if one is due at `now`.
    pub fn on_heartbeat_due(&mut self, now: Instant) {
        match self.next_heartbeat_at() {
            Some(due) if now >= due => {
                self.emit(&Event::Heartbeat);
                self.last_heartbeat_out = Some(now);
            }
            _ => {}
        }
    }

    /// When the instance fails for lack of progress: the connect deadline
    /// while `Connecting`, the heartbeat deadline while `Open`. A timeout too
    /// large to represent as an instant means no deadline.
    pub fn liveness_deadline(&self) -> Option<Instant> {
        let session = self.session.as_ref()?;
        match self.state {
            ConnectionState::Connecting => self
                .connecting_since?
                .checked_add(session.connection_timeout()?),
            ConnectionState::Open => self
                .last_heartbeat_in?
                .checked_add(session.heartbeat_timeout()?),
            _ => None,
        }
    }

    /// Fails the instance if its liveness deadline has passed at `now`.
    pub fn check_liveness(&mut self, now: Instant) {
        let Some(deadline) = self.liveness_deadline() else {
            return;
        };
        if now < deadline {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let error = match (self.state, session.connection_timeout(), session.heartbeat_timeout()) {
            (ConnectionState::Connecting, Some(timeout), _) => ConnectionError::ConnectTimeout { timeout },
            (ConnectionState::Open, _, Some(timeout)) => ConnectionError::HeartbeatTimeout { timeout },
            _ => return,
        };
        self.fail(error);
    }

    // -----------------------------------------------------------------------
    // Dispatcher hooks
    // -----------------------------------------------------------------------

    pub(crate) fn heartbeat_received(&mut self, now: Instant) {
        trace!(connection_id = %self.id, "Heartbeat received");
        self.last_heartbeat_in = Some(now);
        if self.config.echo_heartbeats {
            self.emit(&Event::Heartbeat);
            self.last_heartbeat_out = Some(now);
        }
    }

    pub(crate) fn remote_disconnect(&mut self) {
        if self.state == ConnectionState::Open {
            debug!(connection_id = %self.id, "Server requested disconnect");
            self.transition(ConnectionState::Closing, None);
            self.close_transport();
        }
    }

    pub(crate) fn remote_error(&mut self, reason: String, advice: String) {
        self.fail(ConnectionError::Remote { reason, advice });
    }

    pub(crate) fn acknowledge(&mut self, id: String) {
        if self.config.auto_ack && self.state == ConnectionState::Open {
            self.emit(&Event::Ack { id, args: Vec::new() });
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Sends a protocol-level frame. Send failures are left to the
    /// transport's fail callback.
    fn emit(&mut self, event: &Event) {
        if let Err(error) = self.send(event) {
            warn!(connection_id = %self.id, frame = event.type_name(), error = %error, "Failed to send frame");
        }
    }

    fn close_transport(&mut self) {
        if self.connect_issued && !self.close_sent {
            self.close_sent = true;
            self.transport.close();
        }
    }

    fn fail(&mut self, error: ConnectionError) {
        if self.state.is_terminal() {
            debug!(connection_id = %self.id, state = %self.state, error = %error, "Ignoring failure on terminated connection");
            return;
        }
        self.failure = Some(error.clone());
        self.transition(ConnectionState::Failed, Some(error));
        self.close_transport();
    }

    fn transition(&mut self, to: ConnectionState, error: Option<ConnectionError>) {
        let from = std::mem::replace(&mut self.state, to);
        if to.is_terminal() {
            self.session = None;
            self.connecting_since = None;
            self.last_heartbeat_in = None;
            self.last_heartbeat_out = None;
        }
        self.observer.on_transition(&Transition {
            connection_id: self.id,
            from,
            to,
            error,
            at: Timestamp::now(),
        });
    }
}

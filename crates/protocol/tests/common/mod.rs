//! Synthetic collaborators for driving the lifecycle without I/O.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use protocol::{
    ActionSink, ActionSinkError, ConnectionEndpoint, ConnectionId, ConnectionLifecycle,
    ConnectionState, EndpointResolver, Event, FrameDecodeError, LifecycleConfig,
    LifecycleObserver, SessionDescriptor, SessionId, SinkError, Transition, Transport,
    TransportFailure, TransportName,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    Send(String),
    Close,
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub calls: Vec<Call>,
    pub refuse_connect: bool,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Send(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Close).count()
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, endpoint: &ConnectionEndpoint) -> Result<(), TransportFailure> {
        self.calls.push(Call::Connect(endpoint.to_string()));
        if self.refuse_connect {
            Err(TransportFailure::new("connection refused"))
        } else {
            Ok(())
        }
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportFailure> {
        self.calls.push(Call::Send(payload.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(Call::Close);
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<Transition>>,
    pub frame_errors: Mutex<Vec<FrameDecodeError>>,
    pub sink_errors: Mutex<Vec<ActionSinkError>>,
}

impl RecordingObserver {
    pub fn path(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .map(|t| (t.from, t.to))
            .collect()
    }

    pub fn last(&self) -> Transition {
        self.transitions.lock().unwrap().last().cloned().unwrap()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_transition(&self, transition: &Transition) {
        self.transitions.lock().unwrap().push(transition.clone());
    }

    fn on_frame_error(&self, _id: ConnectionId, error: &FrameDecodeError) {
        self.frame_errors.lock().unwrap().push(error.clone());
    }

    fn on_sink_error(&self, _id: ConnectionId, error: &ActionSinkError) {
        self.sink_errors.lock().unwrap().push(error.clone());
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<Event>>,
    pub reject: bool,
    pub panic: bool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl ActionSink for RecordingSink {
    fn submit(&self, event: Event) -> Result<(), SinkError> {
        if self.panic {
            panic!("sink exploded");
        }
        if self.reject {
            return Err(SinkError::new("engine busy"));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(20);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn descriptor(sid: &str) -> SessionDescriptor {
    SessionDescriptor::new(
        SessionId::new(sid).unwrap(),
        Some(HEARTBEAT_TIMEOUT),
        Some(CONNECT_TIMEOUT),
        BTreeSet::from([TransportName::WebSocket]),
    )
}

pub fn lifecycle(
    config: LifecycleConfig,
) -> (ConnectionLifecycle<RecordingTransport>, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let lifecycle = ConnectionLifecycle::new(
        "example.com",
        EndpointResolver::default(),
        config,
        RecordingTransport::default(),
        observer.clone(),
    );
    (lifecycle, observer)
}

/// Drives a fresh lifecycle to `Open` at `t0`.
pub fn open_lifecycle(
    config: LifecycleConfig,
    t0: Instant,
) -> (ConnectionLifecycle<RecordingTransport>, Arc<RecordingObserver>) {
    let (mut lc, observer) = lifecycle(config);
    lc.begin_handshake().unwrap();
    lc.complete_handshake(Ok(descriptor("sess-1")), t0);
    lc.on_open(t0);
    assert_eq!(lc.state(), ConnectionState::Open);
    (lc, observer)
}

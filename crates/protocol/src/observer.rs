//! Lifecycle observation.
//!
//! Observers receive exactly one [`Transition`] per state change, plus
//! reports of recoverable per-frame and per-event errors. They never mutate
//! the lifecycle.

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    ActionSinkError, ConnectionError, ConnectionId, ConnectionState, FrameDecodeError, Timestamp,
};

/// One state change of a connection lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    /// The lifecycle instance that changed state.
    pub connection_id: ConnectionId,
    /// State before the change.
    pub from: ConnectionState,
    /// State after the change.
    pub to: ConnectionState,
    /// Terminal error, present only for transitions into `Failed`.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ConnectionError>,
    /// Wall-clock time of the change.
    pub at: Timestamp,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<ConnectionError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Receives lifecycle notifications.
pub trait LifecycleObserver: Send + Sync {
    /// Called once for every state transition.
    fn on_transition(&self, transition: &Transition);

    /// Called when an incoming frame could not be decoded and was dropped.
    fn on_frame_error(&self, connection_id: ConnectionId, error: &FrameDecodeError) {
        let _ = (connection_id, error);
    }

    /// Called when the action sink rejected an event.
    fn on_sink_error(&self, connection_id: ConnectionId, error: &ActionSinkError) {
        let _ = (connection_id, error);
    }
}

/// Observer that reports everything through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_transition(&self, t: &Transition) {
        match &t.error {
            Some(error) => warn!(
                connection_id = %t.connection_id,
                from = %t.from,
                to = %t.to,
                error = %error,
                "Connection state changed"
            ),
            None => info!(
                connection_id = %t.connection_id,
                from = %t.from,
                to = %t.to,
                "Connection state changed"
            ),
        }
    }

    fn on_frame_error(&self, connection_id: ConnectionId, error: &FrameDecodeError) {
        warn!(connection_id = %connection_id, raw = %error.raw, error = %error.kind, "Dropped undecodable frame");
    }

    fn on_sink_error(&self, connection_id: ConnectionId, error: &ActionSinkError) {
        warn!(connection_id = %connection_id, event_type = error.event_type, error = %error.message, "Action sink rejected event");
    }
}

//! Event routing.
//!
//! Heartbeat and Noop stay inside the lifecycle. Connection-wide Disconnect
//! and Error drive the lifecycle toward `Closing`/`Failed` and are then also
//! forwarded. Everything else goes straight to the [`ActionSink`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::frame::Event;
use crate::{ActionSinkError, ConnectionLifecycle, SinkError, Transport};

/// Consumer of decoded events (the action-execution engine).
///
/// Invoked on the connection's own task; long-running work must be offloaded
/// by the implementation.
pub trait ActionSink: Send + Sync {
    /// Accepts one event.
    fn submit(&self, event: Event) -> Result<(), SinkError>;
}

/// Routes one decoded event.
///
/// Sink failures, including panics inside [`ActionSink::submit`], come back
/// as [`ActionSinkError`] and leave the lifecycle state untouched.
pub fn dispatch<T: Transport>(
    event: Event,
    lifecycle: &mut ConnectionLifecycle<T>,
    sink: &dyn ActionSink,
    now: Instant,
) -> Result<(), ActionSinkError> {
    match &event {
        Event::Heartbeat => {
            lifecycle.heartbeat_received(now);
            return Ok(());
        }
        Event::Noop => return Ok(()),
        Event::Disconnect { namespace } if namespace.is_empty() => lifecycle.remote_disconnect(),
        Event::Error {
            namespace,
            reason,
            advice,
        } if namespace.is_empty() => lifecycle.remote_error(reason.clone(), advice.clone()),
        _ => {}
    }

    // Ids ending in '+' ask for a data ack, which only the consumer can build.
    let ack_id = event
        .message_id()
        .filter(|id| !id.is_empty() && !id.ends_with('+'))
        .map(str::to_string);

    submit(sink, event)?;

    if let Some(id) = ack_id {
        lifecycle.acknowledge(id);
    }
    Ok(())
}

fn submit(sink: &dyn ActionSink, event: Event) -> Result<(), ActionSinkError> {
    let event_type = event.type_name();
    match panic::catch_unwind(AssertUnwindSafe(|| sink.submit(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(ActionSinkError {
            event_type,
            message: error.message,
        }),
        Err(payload) => Err(ActionSinkError {
            event_type,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("action sink panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("action sink panicked: {s}")
    } else {
        "action sink panicked".to_string()
    }
}

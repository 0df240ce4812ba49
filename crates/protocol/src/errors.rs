//! Error taxonomy and retry-policy types for the connection domain.
//!
//! [`ConnectionError`] is the terminal error attached to a `Failed`
//! transition. [`FrameDecodeError`] and [`ActionSinkError`] are per-frame and
//! per-event conditions: they are reported, never escalated.
//!
//! [`RetryPolicy`] lets the caller decide whether building a fresh connection
//! is worthwhile; the lifecycle itself never retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ConnectionState;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failed connection is worth attempting again and, if so, after
/// what delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// A new connection attempt may succeed.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Retrying cannot help; the configuration or the server must change.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Endpoint resolution
// ---------------------------------------------------------------------------

/// The host identifier cannot be turned into an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid host '{host}': {reason}")]
pub struct InvalidHostError {
    /// The host string as supplied.
    pub host: String,
    /// Why it was rejected.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// A handshake response body that does not match
/// `sid:heartbeat:connection:transports`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed handshake response ({reason}): {body:?}")]
pub struct HandshakeParseError {
    /// The raw response body, kept for diagnostics.
    pub body: String,
    /// Which field was malformed.
    pub reason: String,
}

/// The server offered no transport this client can drive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No supported transport offered (offered: {offered:?})")]
pub struct UnsupportedTransportError {
    /// Transport names exactly as listed by the server.
    pub offered: Vec<String>,
}

/// Any failure of the negotiation exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The request could not be sent or its response could not be read.
    #[error("Handshake request failed: {message}")]
    Request {
        /// Description of the underlying failure.
        message: String,
    },

    /// The server answered with something other than `200`.
    #[error("Handshake rejected with HTTP {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The response body could not be parsed.
    #[error(transparent)]
    Parse(#[from] HandshakeParseError),

    /// The response parsed but offered no usable transport.
    #[error(transparent)]
    UnsupportedTransport(#[from] UnsupportedTransportError),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Reported by the transport's fail callback, or returned by a transport
/// primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transport failure: {reason}")]
pub struct TransportFailure {
    /// Description supplied by the transport.
    pub reason: String,
}

impl TransportFailure {
    /// Creates a failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// What was wrong with an undecodable frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameErrorKind {
    /// The leading segment is not a single digit `0`–`8`.
    #[error("unknown frame type")]
    InvalidType,

    /// The frame type needs more colon-delimited segments than were present.
    #[error("expected at least {required} segments, found {found}")]
    Truncated {
        /// Minimum number of segments for the frame type.
        required: usize,
        /// Segments actually present.
        found: usize,
    },

    /// The embedded JSON payload is invalid or has the wrong shape.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// A binary message whose bytes are not UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// A payload that could not be decoded into an [`crate::Event`].
///
/// Recoverable: the frame is dropped and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot decode frame {raw:?}: {kind}")]
pub struct FrameDecodeError {
    /// The raw payload as received.
    pub raw: String,
    /// The specific problem.
    pub kind: FrameErrorKind,
}

// ---------------------------------------------------------------------------
// Action sink
// ---------------------------------------------------------------------------

/// Returned by an [`crate::ActionSink`] that rejects an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SinkError {
    /// Description supplied by the sink.
    pub message: String,
}

impl SinkError {
    /// Creates a sink error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A sink failure caught at the dispatcher boundary.
///
/// Recoverable: the event is lost but the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Action sink rejected {event_type} event: {message}")]
pub struct ActionSinkError {
    /// Wire name of the event variant that was rejected.
    pub event_type: &'static str,
    /// The sink's error message, or the panic message if it panicked.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// An outbound frame could not be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Frames are only sent while the connection is open.
    #[error("Cannot send while connection is {state}")]
    NotOpen {
        /// State at the time of the attempt.
        state: ConnectionState,
    },

    /// The transport refused the payload.
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

// ---------------------------------------------------------------------------
// Terminal connection errors
// ---------------------------------------------------------------------------

/// The error attached to a transition into `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The host could not be resolved into an endpoint.
    #[error(transparent)]
    InvalidHost(#[from] InvalidHostError),

    /// Negotiation failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportFailure),

    /// No incoming heartbeat within the negotiated heartbeat timeout.
    #[error("No heartbeat received within {timeout:?}")]
    HeartbeatTimeout {
        /// The negotiated heartbeat timeout.
        timeout: Duration,
    },

    /// The transport did not open within the negotiated connection timeout.
    #[error("Transport did not open within {timeout:?}")]
    ConnectTimeout {
        /// The negotiated connection timeout.
        timeout: Duration,
    },

    /// The server sent a connection-wide error frame.
    #[error("Server reported error: reason {reason:?}, advice {advice:?}")]
    Remote {
        /// Reason code or text from the error frame.
        reason: String,
        /// Advice code or text from the error frame.
        advice: String,
    },
}

impl ConnectionError {
    /// Classifies whether a fresh connection attempt could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::InvalidHost(_) => RetryPolicy::NonRetryable,
            Self::Handshake(HandshakeError::Parse(_))
            | Self::Handshake(HandshakeError::UnsupportedTransport(_)) => {
                RetryPolicy::NonRetryable
            }
            Self::Handshake(HandshakeError::Request { .. })
            | Self::Handshake(HandshakeError::UnexpectedStatus { .. })
            | Self::Transport(_)
            | Self::HeartbeatTimeout { .. }
            | Self::ConnectTimeout { .. } => RetryPolicy::Retryable { after: None },
            Self::Remote { reason, advice } => {
                if reason == crate::frame::REASON_UNAUTHORIZED {
                    RetryPolicy::NonRetryable
                } else if advice == crate::frame::ADVICE_RECONNECT {
                    RetryPolicy::Retryable { after: None }
                } else {
                    RetryPolicy::NonRetryable
                }
            }
        }
    }
}

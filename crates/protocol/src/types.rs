//! Shared value types for the session domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! invariants (a descriptor always names a session, transport names come from
//! a closed set) and participate in lifecycle decisions.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SessionId;

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// A transport name the server may offer during the handshake.
///
/// Only [`TransportName::WebSocket`] is driven by this client; the others are
/// recognised so that an offer list can be validated and reported accurately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransportName {
    /// `websocket`
    #[serde(rename = "websocket")]
    WebSocket,
    /// `flashsocket`
    #[serde(rename = "flashsocket")]
    FlashSocket,
    /// `htmlfile`
    #[serde(rename = "htmlfile")]
    HtmlFile,
    /// `xhr-polling`
    #[serde(rename = "xhr-polling")]
    XhrPolling,
    /// `jsonp-polling`
    #[serde(rename = "jsonp-polling")]
    JsonpPolling,
}

impl TransportName {
    /// Parses a wire transport name, returning `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "websocket" => Some(Self::WebSocket),
            "flashsocket" => Some(Self::FlashSocket),
            "htmlfile" => Some(Self::HtmlFile),
            "xhr-polling" => Some(Self::XhrPolling),
            "jsonp-polling" => Some(Self::JsonpPolling),
            _ => None,
        }
    }

    /// Returns the wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::FlashSocket => "flashsocket",
            Self::HtmlFile => "htmlfile",
            Self::XhrPolling => "xhr-polling",
            Self::JsonpPolling => "jsonp-polling",
        }
    }
}

impl std::fmt::Display for TransportName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Session descriptor
// ---------------------------------------------------------------------------

/// Parameters allocated by a successful handshake.
///
/// Immutable once built; a new handshake replaces the whole descriptor rather
/// than patching individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDescriptor {
    session_id: SessionId,
    heartbeat_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
    supported_transports: BTreeSet<TransportName>,
}

impl SessionDescriptor {
    /// Creates a descriptor. A zero timeout is normalised to `None`.
    pub fn new(
        session_id: SessionId,
        heartbeat_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
        supported_transports: BTreeSet<TransportName>,
    ) -> Self {
        Self {
            session_id,
            heartbeat_timeout: heartbeat_timeout.filter(|d| !d.is_zero()),
            connection_timeout: connection_timeout.filter(|d| !d.is_zero()),
            supported_transports,
        }
    }

    /// The server-allocated session id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Maximum silence tolerated between incoming heartbeats. `None` disables
    /// liveness enforcement.
    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout
    }

    /// Maximum time allowed for the upgraded transport to open. `None`
    /// disables the bound.
    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    /// Transports the server is willing to upgrade to.
    pub fn supported_transports(&self) -> &BTreeSet<TransportName> {
        &self.supported_transports
    }

    /// Returns `true` if the server offered `transport`.
    pub fn supports(&self, transport: TransportName) -> bool {
        self.supported_transports.contains(&transport)
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Where a connection lifecycle instance currently is.
///
/// `Closed` and `Failed` are terminal for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Constructed, nothing attempted yet.
    Idle,
    /// Negotiation request in flight.
    Handshaking,
    /// Transport connect issued, waiting for the open callback.
    Connecting,
    /// Transport open; frames flow.
    Open,
    /// Close requested, waiting for the transport close callback.
    Closing,
    /// Closed cleanly.
    Closed,
    /// Terminated by an error.
    Failed,
}

impl ConnectionState {
    /// Returns `true` for `Closed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Handshaking => "handshaking",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

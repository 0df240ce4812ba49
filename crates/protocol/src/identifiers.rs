//! Newtype identifiers.
//!
//! A session id handed out by the server and a connection id generated locally
//! are both "just strings" on the wire and in logs; wrapping them keeps one
//! from being passed where the other is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session identifier allocated by the server during the handshake.
///
/// Never reused: every new connection attempt negotiates a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a server-issued id; `None` if it is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        (!value.is_empty()).then_some(Self(value))
    }

    /// The id as sent by the server.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one connection lifecycle instance.
///
/// Generated fresh for every state machine; attached to log lines and
/// transition notifications so all activity from a single connection attempt
/// can be correlated. A caller-side retry gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new random connection identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! eventwire infrastructure adapters.
//!
//! Implements the [`protocol`] ports against real I/O and provides the async
//! driver that owns a [`protocol::ConnectionLifecycle`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP, sockets, timers and task plumbing live here. The
//! [`protocol`] crate sees only its own port traits.
//!
//! | Type | Role |
//! |------|------|
//! | [`HttpHandshake`] | [`protocol::HandshakeExchange`] over `reqwest` |
//! | [`WebSocketTransport`] | [`protocol::Transport`] over `tokio-tungstenite` |
//! | [`Client`] / [`ClientHandle`] | Run loop: transport events, commands, heartbeat and liveness timers |
//! | [`ClientConfig`] | Deserializable settings |

pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod ws;

pub use client::{Client, ClientHandle, ClientOutcome};
pub use config::ClientConfig;
pub use errors::ConnectorError;
pub use http::HttpHandshake;
pub use ws::{TransportEvent, WebSocketTransport};

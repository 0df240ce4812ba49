//! Protocol domain for eventwire.
//!
//! This crate holds everything needed to negotiate a session, run the
//! connection lifecycle and decode wire frames, expressed against port traits
//! rather than concrete I/O. Infrastructure crates implement the ports; they
//! never add protocol rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No sockets, no HTTP, no clocks: the
//! state machine is driven entirely by explicit calls, which is what makes it
//! testable with synthetic events.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `SessionId`, `ConnectionId` |
//! | [`types`] | `SessionDescriptor`, `TransportName`, `ConnectionState`, `Timestamp` |
//! | [`errors`] | Error taxonomy and `RetryPolicy` |
//! | [`endpoint`] | Endpoint resolver (negotiation and upgrade URIs) |
//! | [`handshake`] | `HandshakeExchange` port, body parsing, `negotiate` |
//! | [`frame`] | `Event`, `decode`, `encode` |
//! | [`lifecycle`] | `ConnectionLifecycle` state machine and `Transport` port |
//! | [`dispatch`] | Event routing and the `ActionSink` port |
//! | [`observer`] | `LifecycleObserver` port and `TracingObserver` |
//!
//! ## Ports
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`HandshakeExchange`] | `connector::HttpHandshake` (reqwest) |
//! | [`Transport`] | `connector::WebSocketTransport` (tokio-tungstenite) |
//! | [`ActionSink`] | the downstream automation engine |
//! | [`LifecycleObserver`] | [`TracingObserver`], or anything that records transitions |

pub mod dispatch;
pub mod endpoint;
pub mod errors;
pub mod frame;
pub mod handshake;
pub mod identifiers;
pub mod lifecycle;
pub mod observer;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dispatch::{dispatch, ActionSink};
pub use endpoint::{ConnectionEndpoint, EndpointResolver, SESSION_QUERY_PARAM};
pub use errors::{
    ActionSinkError, ConnectionError, FrameDecodeError, FrameErrorKind, HandshakeError,
    HandshakeParseError, InvalidHostError, RetryPolicy, SendError, SinkError, TransportFailure,
    UnsupportedTransportError,
};
pub use frame::{decode, encode, Event};
pub use handshake::{negotiate, parse_handshake_body, HandshakeExchange, HandshakeResponse};
pub use identifiers::{ConnectionId, SessionId};
pub use lifecycle::{ConnectionLifecycle, LifecycleConfig, Transport};
pub use observer::{LifecycleObserver, TracingObserver, Transition};
pub use types::{ConnectionState, SessionDescriptor, Timestamp, TransportName};

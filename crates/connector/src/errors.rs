//! Errors raised by the infrastructure adapters themselves.
//!
//! Anything that happens on a live connection is reported through the
//! lifecycle as a `protocol` error; these cover building adapters and talking
//! to a client that has already stopped.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// The HTTP client could not be constructed.
    #[error("Cannot build HTTP client: {message}")]
    HttpClient {
        /// Underlying builder error.
        message: String,
    },

    /// The client's run loop has finished; commands can no longer be
    /// delivered.
    #[error("Client has stopped")]
    ClientStopped,
}

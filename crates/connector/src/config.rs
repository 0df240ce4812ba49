//! Client configuration.

use std::time::Duration;

use protocol::{EndpointResolver, LifecycleConfig};
use serde::{Deserialize, Serialize};

/// Settings for one [`crate::Client`].
///
/// Every field has a default, so a partial TOML table or JSON object is
/// enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Authority to connect to (`host` or `host:port`).
    #[serde(default = "default_host")]
    pub host: String,

    /// Resource path prefix of the negotiation endpoint.
    #[serde(default = "default_resource")]
    pub resource: String,

    /// Protocol version segment.
    #[serde(default = "default_protocol")]
    pub protocol: u32,

    /// Upper bound on the handshake request, in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Outbound heartbeat interval in seconds. Unset (or 0) derives it from
    /// the negotiated heartbeat timeout.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,

    /// Answer incoming heartbeats.
    #[serde(default = "default_true")]
    pub echo_heartbeats: bool,

    /// Acknowledge message frames that ask for a plain ack.
    #[serde(default = "default_true")]
    pub auto_ack: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            resource: default_resource(),
            protocol: default_protocol(),
            handshake_timeout_secs: default_handshake_timeout(),
            heartbeat_interval_secs: None,
            echo_heartbeats: true,
            auto_ack: true,
        }
    }
}

impl ClientConfig {
    /// Resolver for the configured resource and protocol.
    pub fn resolver(&self) -> EndpointResolver {
        EndpointResolver::new(self.resource.clone(), self.protocol)
    }

    /// Lifecycle tunables.
    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            heartbeat_interval: self
                .heartbeat_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            echo_heartbeats: self.echo_heartbeats,
            auto_ack: self.auto_ack,
        }
    }

    /// Request timeout for the negotiation GET.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn default_host() -> String {
    "localhost:8080".to_string()
}

fn default_resource() -> String {
    "socket.io".to_string()
}

fn default_protocol() -> u32 {
    1
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

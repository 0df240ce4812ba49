//! Endpoint resolution.
//!
//! Turns a bare host identifier into either the negotiation endpoint
//! (`http://host/socket.io/1/`) or, once a session id is known, the upgrade
//! endpoint (`ws://host/socket.io/1/websocket/?sid=...`). All parsing and
//! percent-encoding is delegated to [`url`].

use url::Url;

use crate::{InvalidHostError, SessionId, TransportName};

/// Query parameter carrying the negotiated session id on the upgrade endpoint.
pub const SESSION_QUERY_PARAM: &str = "sid";

/// A fully qualified endpoint for either the handshake or the upgraded
/// transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    url: Url,
}

impl ConnectionEndpoint {
    /// URI scheme (`http` for negotiation, `ws` for the upgrade).
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host without port.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Explicit port, if one was given and differs from the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// Percent-encoded path.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the decoded value of the first query parameter named `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns `true` for the transport-upgrade endpoint.
    pub fn is_upgrade(&self) -> bool {
        self.query_param(SESSION_QUERY_PARAM).is_some()
    }

    /// The rendered endpoint.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a copy of the underlying [`Url`].
    pub fn to_url(&self) -> Url {
        self.url.clone()
    }
}

impl std::fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Builds negotiation and upgrade endpoints for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResolver {
    resource: String,
    protocol: u32,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self {
            resource: "socket.io".to_string(),
            protocol: 1,
        }
    }
}

impl EndpointResolver {
    /// Creates a resolver for a custom resource path and protocol revision.
    pub fn new(resource: impl Into<String>, protocol: u32) -> Self {
        Self {
            resource: resource.into(),
            protocol,
        }
    }

    /// Resolves `host` into the negotiation endpoint (no session id) or the
    /// upgrade endpoint (with session id).
    ///
    /// `host` must be a bare authority: `name`, `name:port`, an IPv4 literal
    /// or a bracketed IPv6 literal.
    pub fn resolve(
        &self,
        host: &str,
        session_id: Option<&SessionId>,
    ) -> Result<ConnectionEndpoint, InvalidHostError> {
        let invalid = |reason: &str| InvalidHostError {
            host: host.to_string(),
            reason: reason.to_string(),
        };

        if host.trim().is_empty() {
            return Err(invalid("host is empty"));
        }
        if host.contains(|c: char| c.is_control() || c.is_whitespace()) {
            return Err(invalid("host contains whitespace or control characters"));
        }
        if host.contains(|c: char| matches!(c, '/' | '?' | '#' | '@' | '\\')) {
            return Err(invalid("expected a bare host, not a URI"));
        }

        let scheme = if session_id.is_some() { "ws" } else { "http" };
        let mut url = Url::parse(&format!("{scheme}://{host}/"))
            .map_err(|e| invalid(&e.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("no host component"));
        }

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| invalid("cannot be used as a base URI"))?;
            segments.clear();
            segments.extend(self.resource.split('/').filter(|s| !s.is_empty()));
            segments.push(&self.protocol.to_string());
            if session_id.is_some() {
                segments.push(TransportName::WebSocket.as_str());
            }
            // Trailing slash.
            segments.push("");
        }

        if let Some(sid) = session_id {
            url.query_pairs_mut()
                .append_pair(SESSION_QUERY_PARAM, sid.as_str());
        }

        Ok(ConnectionEndpoint { url })
    }
}

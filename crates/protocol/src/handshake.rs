//! Handshake negotiation.
//!
//! One HTTP GET against the negotiation endpoint returns a body of the form
//! `session_id:heartbeat_timeout:connection_timeout:transport,transport,...`.
//! The request itself is performed by a [`HandshakeExchange`] implementation
//! supplied by an infrastructure crate; this module owns validation.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    ConnectionEndpoint, HandshakeError, HandshakeParseError, SessionDescriptor, SessionId,
    TransportName, UnsupportedTransportError,
};

/// Raw response to the negotiation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Performs the negotiation request/response exchange.
///
/// Implementations perform exactly one request and never retry; mapping
/// I/O problems to [`HandshakeError::Request`] is their responsibility.
#[async_trait]
pub trait HandshakeExchange: Send + Sync {
    /// Issues a GET against `endpoint`.
    async fn get(&self, endpoint: &ConnectionEndpoint) -> Result<HandshakeResponse, HandshakeError>;
}

/// Runs one negotiation exchange and validates the result.
pub async fn negotiate(
    exchange: &dyn HandshakeExchange,
    endpoint: &ConnectionEndpoint,
) -> Result<SessionDescriptor, HandshakeError> {
    debug!(endpoint = %endpoint, "Negotiating session");
    let response = exchange.get(endpoint).await?;
    if response.status != 200 {
        return Err(HandshakeError::UnexpectedStatus {
            status: response.status,
            body: response.body,
        });
    }
    parse_handshake_body(&response.body)
}

/// Parses and validates a handshake response body.
///
/// Unknown transport names are ignored; the result must still offer
/// `websocket` since that is the only transport this client upgrades to.
pub fn parse_handshake_body(body: &str) -> Result<SessionDescriptor, HandshakeError> {
    let malformed = |reason: &str| {
        HandshakeError::Parse(HandshakeParseError {
            body: body.to_string(),
            reason: reason.to_string(),
        })
    };

    let fields: Vec<&str> = body.trim().split(':').collect();
    let [sid, heartbeat, connection, transports] = fields.as_slice() else {
        return Err(malformed("expected four colon-delimited fields"));
    };

    let session_id = SessionId::new(*sid).ok_or_else(|| malformed("empty session id"))?;
    let heartbeat_timeout =
        parse_timeout(heartbeat).ok_or_else(|| malformed("invalid heartbeat timeout"))?;
    let connection_timeout =
        parse_timeout(connection).ok_or_else(|| malformed("invalid connection timeout"))?;

    let offered: Vec<String> = transports
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    let supported: BTreeSet<TransportName> =
        offered.iter().filter_map(|t| TransportName::parse(t)).collect();
    if !supported.contains(&TransportName::WebSocket) {
        return Err(UnsupportedTransportError { offered }.into());
    }

    Ok(SessionDescriptor::new(
        session_id,
        heartbeat_timeout,
        connection_timeout,
        supported,
    ))
}

/// `""` and `"0"` disable the timeout; anything else must be a non-negative
/// integer number of seconds.
fn parse_timeout(field: &str) -> Option<Option<Duration>> {
    if field.is_empty() {
        return Some(None);
    }
    let secs: u64 = field.parse().ok()?;
    Some((secs > 0).then(|| Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EndpointResolver;

    struct Canned(Result<HandshakeResponse, HandshakeError>);

    #[async_trait]
    impl HandshakeExchange for Canned {
        async fn get(
            &self,
            _endpoint: &ConnectionEndpoint,
        ) -> Result<HandshakeResponse, HandshakeError> {
            self.0.clone()
        }
    }

    fn endpoint() -> ConnectionEndpoint {
        EndpointResolver::default().resolve("localhost", None).unwrap()
    }

    #[test]
    fn valid_bodies_yield_matching_descriptors() {
        let cases = [
            ("abc:60:25:websocket,xhr-polling", "abc", 60, 25, vec![TransportName::WebSocket, TransportName::XhrPolling]),
            ("x9:15:10:websocket", "x9", 15, 10, vec![TransportName::WebSocket]),
            (
                "4d4f185e96a7b:1:1:flashsocket,websocket,htmlfile",
                "4d4f185e96a7b",
                1,
                1,
                vec![TransportName::FlashSocket, TransportName::WebSocket, TransportName::HtmlFile],
            ),
        ];
        for (body, sid, ht, ct, transports) in cases {
            let d = parse_handshake_body(body).unwrap();
            assert_eq!(d.session_id().as_str(), sid);
            assert_eq!(d.heartbeat_timeout(), Some(Duration::from_secs(ht)));
            assert_eq!(d.connection_timeout(), Some(Duration::from_secs(ct)));
            assert_eq!(
                d.supported_transports(),
                &transports.into_iter().collect::<BTreeSet<_>>()
            );
        }
    }

    #[test]
    fn zero_or_empty_timeouts_are_disabled() {
        let d = parse_handshake_body("s:0::websocket").unwrap();
        assert_eq!(d.heartbeat_timeout(), None);
        assert_eq!(d.connection_timeout(), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let d = parse_handshake_body("s:5:5:websocket\n").unwrap();
        assert_eq!(d.session_id().as_str(), "s");
    }

    #[test]
    fn malformed_fields_keep_the_raw_body() {
        for body in ["", "s:1:1", ":1:1:websocket", "s:-1:1:websocket", "s:1:x:websocket", "s:1:1:websocket:extra"] {
            match parse_handshake_body(body) {
                Err(HandshakeError::Parse(e)) => assert_eq!(e.body, body),
                other => panic!("{body:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn missing_websocket_is_unsupported() {
        match parse_handshake_body("s:1:1:xhr-polling,carrier-pigeon") {
            Err(HandshakeError::UnsupportedTransport(e)) => {
                assert_eq!(e.offered, vec!["xhr-polling", "carrier-pigeon"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_handshake_body("s:1:1:"),
            Err(HandshakeError::UnsupportedTransport(_))
        ));
    }

    #[tokio::test]
    async fn negotiate_rejects_non_200() {
        let exchange = Canned(Ok(HandshakeResponse {
            status: 503,
            body: "busy".into(),
        }));
        let err = negotiate(&exchange, &endpoint()).await.unwrap_err();
        assert_eq!(
            err,
            HandshakeError::UnexpectedStatus {
                status: 503,
                body: "busy".into()
            }
        );
    }

    #[tokio::test]
    async fn negotiate_parses_200_body() {
        let exchange = Canned(Ok(HandshakeResponse {
            status: 200,
            body: "sid:60:60:websocket".into(),
        }));
        let d = negotiate(&exchange, &endpoint()).await.unwrap();
        assert_eq!(d.session_id().as_str(), "sid");
    }

    #[tokio::test]
    async fn negotiate_propagates_request_errors() {
        let exchange = Canned(Err(HandshakeError::Request {
            message: "connection refused".into(),
        }));
        assert!(matches!(
            negotiate(&exchange, &endpoint()).await,
            Err(HandshakeError::Request { .. })
        ));
    }
}

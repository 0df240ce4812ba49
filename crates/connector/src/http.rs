//! `reqwest` implementation of the handshake exchange.

use std::time::Duration;

use async_trait::async_trait;
use protocol::{ConnectionEndpoint, HandshakeError, HandshakeExchange, HandshakeResponse};
use tracing::debug;

use crate::ConnectorError;

/// Performs the negotiation GET over HTTP.
#[derive(Debug, Clone)]
pub struct HttpHandshake {
    client: reqwest::Client,
}

impl HttpHandshake {
    /// Builds an exchange whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::HttpClient {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HandshakeExchange for HttpHandshake {
    async fn get(&self, endpoint: &ConnectionEndpoint) -> Result<HandshakeResponse, HandshakeError> {
        debug!(endpoint = %endpoint, "Sending handshake request");
        let response = self
            .client
            .get(endpoint.as_str())
            .send()
            .await
            .map_err(|e| HandshakeError::Request {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| HandshakeError::Request {
            message: format!("failed to read response body: {e}"),
        })?;
        debug!(endpoint = %endpoint, status, "Handshake response received");
        Ok(HandshakeResponse { status, body })
    }
}

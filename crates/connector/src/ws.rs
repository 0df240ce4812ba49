//! WebSocket transport.
//!
//! [`WebSocketTransport`] implements the synchronous [`Transport`] port by
//! forwarding commands to a socket task. The task owns both socket halves and
//! reports what happens as [`TransportEvent`]s, one per lifecycle callback.

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use protocol::{ConnectionEndpoint, Transport, TransportFailure};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

/// How long to wait for the peer's close frame after sending ours.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Socket activity, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The upgrade completed.
    Opened,
    /// A text frame.
    Message(String),
    /// A binary frame, passed through undecoded.
    Binary(Vec<u8>),
    /// The socket closed cleanly.
    Closed,
    /// Connecting, reading or writing failed.
    Failed(String),
}

#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

/// Request side of one websocket connection.
#[derive(Debug)]
pub struct WebSocketTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl WebSocketTransport {
    /// Creates an unconnected transport and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                commands: None,
            },
            rx,
        )
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, endpoint: &ConnectionEndpoint) -> Result<(), TransportFailure> {
        if self.commands.is_some() {
            return Err(TransportFailure::new("transport is already connected"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportFailure::new(format!("no async runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(endpoint.to_string(), rx, self.events.clone()));
        self.commands = Some(tx);
        Ok(())
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportFailure> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| TransportFailure::new("transport is not connected"))?;
        commands
            .send(Command::Send(payload.to_string()))
            .map_err(|_| TransportFailure::new("socket task has stopped"))
    }

    fn close(&mut self) {
        if let Some(commands) = &self.commands {
            // A stopped task has nothing left to close.
            let _ = commands.send(Command::Close);
        }
    }
}

async fn run_socket(
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    debug!(url = %url, "Connecting websocket");
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = wait_for_close(&mut commands) => {
            debug!(url = %url, "Close requested before websocket opened");
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };
    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = events.send(TransportEvent::Failed(e.to_string()));
            return;
        }
    };
    debug!(url = %url, "Websocket connected");
    let _ = events.send(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = events.send(TransportEvent::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer closed websocket");
                    let _ = events.send(TransportEvent::Closed);
                    return;
                }
                // Pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Failed(e.to_string()));
                    return;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed);
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => {
                    trace!(payload = %payload, "Writing frame");
                    if let Err(e) = write.send(Message::Text(payload.into())).await {
                        let _ = events.send(TransportEvent::Failed(e.to_string()));
                        return;
                    }
                }
                Some(Command::Close) | None => break,
            },
        }
    }

    if let Err(e) = write.close().await {
        warn!(error = %e, "Failed to send websocket close frame");
    }
    let drained = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(message)) = read.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        debug!("Peer did not acknowledge close in time");
    }
    let _ = events.send(TransportEvent::Closed);
}

/// Resolves once a close is requested or every sender is gone.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Close) | None => return,
            Some(Command::Send(payload)) => {
                warn!(payload = %payload, "Dropping frame sent before websocket opened");
            }
        }
    }
}

//! End-to-end client runs against an in-process axum server that speaks the
//! handshake and websocket halves of the protocol.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use connector::{Client, ClientConfig, ClientHandle};
use protocol::{
    ActionSink, ConnectionError, ConnectionState, Event, HandshakeError, RetryPolicy, SinkError,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Scripted server
// =============================================================================

struct Script {
    handshake_status: StatusCode,
    handshake_body: String,
    /// Frames pushed to the client right after the upgrade.
    frames: Vec<String>,
    /// Close the socket once the frames are out.
    hang_up: bool,
    received: mpsc::UnboundedSender<String>,
    sid: Mutex<Option<String>>,
}

impl Script {
    fn new(frames: &[&str]) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (received, rx) = mpsc::unbounded_channel();
        (
            Self {
                handshake_status: StatusCode::OK,
                handshake_body: "sid123:20:10:websocket,xhr-polling".to_string(),
                frames: frames.iter().map(|f| f.to_string()).collect(),
                hang_up: false,
                received,
                sid: Mutex::new(None),
            },
            rx,
        )
    }
}

async fn handshake(State(script): State<Arc<Script>>) -> (StatusCode, String) {
    (script.handshake_status, script.handshake_body.clone())
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(script): State<Arc<Script>>,
) -> impl IntoResponse {
    *script.sid.lock().unwrap() = query.get("sid").cloned();
    ws.on_upgrade(move |socket| session(socket, script))
}

async fn session(mut socket: WebSocket, script: Arc<Script>) {
    for frame in &script.frames {
        if socket.send(Message::Text(frame.as_str().into())).await.is_err() {
            return;
        }
    }
    if script.hang_up {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let _ = script.received.send(text.as_str().to_owned());
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

async fn serve(script: Script) -> (SocketAddr, Arc<Script>) {
    let script = Arc::new(script);
    let app = Router::new()
        .route("/socket.io/1/", get(handshake))
        .route("/socket.io/1/websocket/", get(upgrade))
        .with_state(script.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, script)
}

// =============================================================================
// Sink
// =============================================================================

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<Event>>,
    close_after: Option<usize>,
    handle: OnceLock<ClientHandle>,
}

impl CollectingSink {
    fn closing_after(n: usize) -> Self {
        Self {
            close_after: Some(n),
            ..Default::default()
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl ActionSink for CollectingSink {
    fn submit(&self, event: Event) -> Result<(), SinkError> {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        if Some(events.len()) == self.close_after {
            if let Some(handle) = self.handle.get() {
                handle.close();
            }
        }
        Ok(())
    }
}

fn client(addr: SocketAddr, sink: &Arc<CollectingSink>) -> Client {
    let config = ClientConfig {
        host: addr.to_string(),
        ..Default::default()
    };
    let client = Client::new(config, sink.clone()).unwrap();
    let _ = sink.handle.set(client.handle());
    client
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn events_reach_sink_and_sink_can_close() {
    let (script, mut received) = Script::new(&[
        "1::",
        "3:1::hello",
        r#"5:::{"name":"ping","args":[1]}"#,
    ]);
    let (addr, script) = serve(script).await;
    let sink = Arc::new(CollectingSink::closing_after(3));

    let outcome = timeout(TIMEOUT, client(addr, &sink).run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Closed);
    assert!(outcome.clone().into_result().is_ok());
    assert_eq!(script.sid.lock().unwrap().as_deref(), Some("sid123"));
    assert_eq!(
        sink.events(),
        vec![
            Event::Connect {
                namespace: String::new(),
                query: String::new()
            },
            Event::RawMessage {
                id: "1".into(),
                namespace: String::new(),
                text: "hello".into()
            },
            Event::NamedEvent {
                id: String::new(),
                namespace: String::new(),
                name: "ping".into(),
                args: vec![json!(1)]
            },
        ]
    );
    assert_eq!(received.try_recv().ok().as_deref(), Some("6:::1"));
}

#[tokio::test]
async fn server_disconnect_closes_cleanly() {
    let (script, _received) = Script::new(&["1::", "0::"]);
    let (addr, _script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());

    let outcome = timeout(TIMEOUT, client(addr, &sink).run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Closed);
    assert_eq!(outcome.error, None);
    assert_eq!(sink.events().len(), 2);
}

#[tokio::test]
async fn server_hang_up_closes() {
    let (mut script, _received) = Script::new(&["1::"]);
    script.hang_up = true;
    let (addr, _script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());

    let outcome = timeout(TIMEOUT, client(addr, &sink).run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Closed);
}

#[tokio::test]
async fn server_error_frame_fails_the_connection() {
    let (script, _received) = Script::new(&["7:::2+0"]);
    let (addr, _script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());

    let outcome = timeout(TIMEOUT, client(addr, &sink).run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Failed);
    let error = outcome.into_result().unwrap_err();
    assert_eq!(
        error,
        ConnectionError::Remote {
            reason: "2".into(),
            advice: "0".into()
        }
    );
    assert_eq!(error.retry_policy(), RetryPolicy::NonRetryable);
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn rejected_handshake_fails_before_upgrade() {
    let (mut script, _received) = Script::new(&[]);
    script.handshake_status = StatusCode::INTERNAL_SERVER_ERROR;
    script.handshake_body = "boom".to_string();
    let (addr, script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());

    let outcome = timeout(TIMEOUT, client(addr, &sink).run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Failed);
    assert_eq!(
        outcome.error,
        Some(ConnectionError::Handshake(HandshakeError::UnexpectedStatus {
            status: 500,
            body: "boom".into()
        }))
    );
    assert!(script.sid.lock().unwrap().is_none());
}

#[tokio::test]
async fn incoming_heartbeat_is_echoed_until_closed() {
    let (script, mut received) = Script::new(&["1::", "2::"]);
    let (addr, _script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());
    let client = client(addr, &sink);
    let handle = client.handle();

    let run = tokio::spawn(client.run());
    let echoed = timeout(TIMEOUT, received.recv()).await.unwrap();
    assert_eq!(echoed.as_deref(), Some("2::"));

    handle.close();
    handle.close();
    let outcome = timeout(TIMEOUT, run).await.unwrap().unwrap();
    assert_eq!(outcome.state, ConnectionState::Closed);
    assert!(handle.send(Event::Heartbeat).is_err());
}

#[tokio::test]
async fn sends_before_open_are_flushed_on_open() {
    let (script, mut received) = Script::new(&[]);
    let (addr, _script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());
    let client = client(addr, &sink);
    let handle = client.handle();

    handle
        .send(Event::RawMessage {
            id: String::new(),
            namespace: String::new(),
            text: "early".into(),
        })
        .unwrap();
    let run = tokio::spawn(client.run());

    let first = timeout(TIMEOUT, received.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("3:::early"));

    handle.close();
    let outcome = timeout(TIMEOUT, run).await.unwrap().unwrap();
    assert_eq!(outcome.state, ConnectionState::Closed);
}

#[tokio::test]
async fn silent_server_trips_heartbeat_timeout() {
    let (mut script, _received) = Script::new(&["1::"]);
    script.handshake_body = "quiet:1:10:websocket".to_string();
    let (addr, _script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());

    let outcome = timeout(TIMEOUT, client(addr, &sink).run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Failed);
    assert_eq!(
        outcome.error,
        Some(ConnectionError::HeartbeatTimeout {
            timeout: Duration::from_secs(1)
        })
    );
    assert!(matches!(
        outcome.error.map(|e| e.retry_policy()),
        Some(RetryPolicy::Retryable { .. })
    ));
}

#[tokio::test]
async fn close_before_run_ends_closed_without_connecting() {
    let (script, _received) = Script::new(&[]);
    let (addr, script) = serve(script).await;
    let sink = Arc::new(CollectingSink::default());
    let client = client(addr, &sink);
    client.handle().close();

    let outcome = timeout(TIMEOUT, client.run()).await.unwrap();

    assert_eq!(outcome.state, ConnectionState::Closed);
    assert!(script.sid.lock().unwrap().is_none());
}

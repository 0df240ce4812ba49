//! Wire frame codec.
//!
//! A frame is `type:id:namespace:payload`, split on the first three colons
//! only; the payload may itself contain colons. The leading digit selects the
//! [`Event`] variant.
//!
//! | digit | event | minimum segments |
//! |-------|-------|------------------|
//! | 0 | [`Event::Disconnect`] | 1 |
//! | 1 | [`Event::Connect`] | 3 |
//! | 2 | [`Event::Heartbeat`] | 1 |
//! | 3 | [`Event::RawMessage`] | 4 |
//! | 4 | [`Event::JsonMessage`] | 4 |
//! | 5 | [`Event::NamedEvent`] | 4 |
//! | 6 | [`Event::Ack`] | 4 |
//! | 7 | [`Event::Error`] | 3 |
//! | 8 | [`Event::Noop`] | 1 |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FrameDecodeError, FrameErrorKind};

/// Error reason code: the requested transport is not supported.
pub const REASON_TRANSPORT_NOT_SUPPORTED: &str = "0";
/// Error reason code: the client skipped or lost its handshake.
pub const REASON_CLIENT_NOT_HANDSHAKEN: &str = "1";
/// Error reason code: the server refused authorization.
pub const REASON_UNAUTHORIZED: &str = "2";
/// Error advice code: the client should reconnect.
pub const ADVICE_RECONNECT: &str = "0";

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Disconnect the given namespace, or the whole connection when empty.
    Disconnect {
        /// Target namespace.
        namespace: String,
    },
    /// Namespace connect (or its confirmation from the server).
    Connect {
        /// Namespace being connected.
        namespace: String,
        /// Optional query string.
        query: String,
    },
    /// Liveness signal.
    Heartbeat,
    /// Plain text message.
    RawMessage {
        /// Message id; empty when none. A trailing `+` requests a data ack.
        id: String,
        /// Namespace.
        namespace: String,
        /// Message text.
        text: String,
    },
    /// JSON message.
    JsonMessage {
        /// Message id; empty when none.
        id: String,
        /// Namespace.
        namespace: String,
        /// Parsed payload.
        data: Value,
    },
    /// Named event with positional arguments.
    NamedEvent {
        /// Message id; empty when none.
        id: String,
        /// Namespace.
        namespace: String,
        /// Event name.
        name: String,
        /// Event arguments.
        args: Vec<Value>,
    },
    /// Acknowledgement of a previously sent message.
    Ack {
        /// Id of the acknowledged message.
        id: String,
        /// Data returned with the acknowledgement.
        args: Vec<Value>,
    },
    /// Server error.
    Error {
        /// Namespace the error applies to; empty for the whole connection.
        namespace: String,
        /// Reason code or text.
        reason: String,
        /// Advice code or text.
        advice: String,
    },
    /// No-op, used by the server to flush polling transports.
    Noop,
}

#[derive(Serialize, Deserialize)]
struct NamedEventPayload {
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl Event {
    /// Wire type digit.
    pub fn type_digit(&self) -> char {
        match self {
            Self::Disconnect { .. } => '0',
            Self::Connect { .. } => '1',
            Self::Heartbeat => '2',
            Self::RawMessage { .. } => '3',
            Self::JsonMessage { .. } => '4',
            Self::NamedEvent { .. } => '5',
            Self::Ack { .. } => '6',
            Self::Error { .. } => '7',
            Self::Noop => '8',
        }
    }

    /// Short name of the variant, used in logs and error reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Disconnect { .. } => "disconnect",
            Self::Connect { .. } => "connect",
            Self::Heartbeat => "heartbeat",
            Self::RawMessage { .. } => "raw_message",
            Self::JsonMessage { .. } => "json_message",
            Self::NamedEvent { .. } => "named_event",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::Noop => "noop",
        }
    }

    /// Message id for message variants that carry one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::RawMessage { id, .. }
            | Self::JsonMessage { id, .. }
            | Self::NamedEvent { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Human-readable description of an [`Event::Error`], translating known
    /// reason and advice codes.
    pub fn error_description(&self) -> Option<String> {
        let Self::Error { reason, advice, .. } = self else {
            return None;
        };
        let reason = match reason.as_str() {
            REASON_TRANSPORT_NOT_SUPPORTED => "transport not supported",
            REASON_CLIENT_NOT_HANDSHAKEN => "client not handshaken",
            REASON_UNAUTHORIZED => "unauthorized",
            other => other,
        };
        Some(match advice.as_str() {
            "" => reason.to_string(),
            ADVICE_RECONNECT => format!("{reason} (advice: reconnect)"),
            other => format!("{reason} (advice: {other})"),
        })
    }
}

/// Decodes one payload into an [`Event`].
pub fn decode(payload: &str) -> Result<Event, FrameDecodeError> {
    let fail = |kind| FrameDecodeError {
        raw: payload.to_string(),
        kind,
    };

    let segments: Vec<&str> = payload.splitn(4, ':').collect();
    let digit = match segments[0].as_bytes() {
        [d @ b'0'..=b'8'] => *d,
        _ => return Err(fail(FrameErrorKind::InvalidType)),
    };

    let required = match digit {
        b'0' | b'2' | b'8' => 1,
        b'1' | b'7' => 3,
        _ => 4,
    };
    if segments.len() < required {
        return Err(fail(FrameErrorKind::Truncated {
            required,
            found: segments.len(),
        }));
    }

    let field = |i: usize| segments.get(i).copied().unwrap_or_default();
    let (id, namespace, data) = (field(1), field(2), field(3));
    let json = |text: &str| {
        serde_json::from_str::<Value>(text)
            .map_err(|e| fail(FrameErrorKind::InvalidJson(e.to_string())))
    };

    let event = match digit {
        b'0' => Event::Disconnect {
            namespace: namespace.to_string(),
        },
        b'1' => Event::Connect {
            namespace: namespace.to_string(),
            query: data.to_string(),
        },
        b'2' => Event::Heartbeat,
        b'3' => Event::RawMessage {
            id: id.to_string(),
            namespace: namespace.to_string(),
            text: data.to_string(),
        },
        b'4' => Event::JsonMessage {
            id: id.to_string(),
            namespace: namespace.to_string(),
            data: json(data)?,
        },
        b'5' => {
            let NamedEventPayload { name, args } = serde_json::from_str(data)
                .map_err(|e| fail(FrameErrorKind::InvalidJson(e.to_string())))?;
            Event::NamedEvent {
                id: id.to_string(),
                namespace: namespace.to_string(),
                name,
                args,
            }
        }
        b'6' => {
            let (ack_id, args) = match data.split_once('+') {
                Some((ack_id, args)) => match json(args)? {
                    Value::Array(args) => (ack_id, args),
                    _ => {
                        return Err(fail(FrameErrorKind::InvalidJson(
                            "ack arguments must be an array".to_string(),
                        )))
                    }
                },
                None => (data, Vec::new()),
            };
            Event::Ack {
                id: ack_id.to_string(),
                args,
            }
        }
        b'7' => {
            let (reason, advice) = data.split_once('+').unwrap_or((data, ""));
            Event::Error {
                namespace: namespace.to_string(),
                reason: reason.to_string(),
                advice: advice.to_string(),
            }
        }
        _ => Event::Noop,
    };
    Ok(event)
}

/// Encodes an [`Event`] into its canonical wire form.
///
/// `decode(&encode(e)) == Ok(e)` holds for every event.
pub fn encode(event: &Event) -> String {
    let t = event.type_digit();
    match event {
        Event::Disconnect { namespace } => format!("{t}::{namespace}"),
        Event::Connect { namespace, query } if query.is_empty() => format!("{t}::{namespace}"),
        Event::Connect { namespace, query } => format!("{t}::{namespace}:{query}"),
        Event::Heartbeat | Event::Noop => format!("{t}::"),
        Event::RawMessage { id, namespace, text } => format!("{t}:{id}:{namespace}:{text}"),
        Event::JsonMessage { id, namespace, data } => format!("{t}:{id}:{namespace}:{data}"),
        Event::NamedEvent {
            id,
            namespace,
            name,
            args,
        } => {
            let payload = serde_json::json!({ "name": name, "args": args });
            format!("{t}:{id}:{namespace}:{payload}")
        }
        Event::Ack { id, args } if args.is_empty() => format!("{t}:::{id}"),
        Event::Ack { id, args } => format!("{t}:::{id}+{}", Value::Array(args.clone())),
        Event::Error {
            namespace,
            reason,
            advice,
        } if advice.is_empty() => format!("{t}::{namespace}:{reason}"),
        Event::Error {
            namespace,
            reason,
            advice,
        } => format!("{t}::{namespace}:{reason}+{advice}"),
    }
}

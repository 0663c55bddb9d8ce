//! JSON hub protocol.
//!
//! Every frame is a JSON object terminated by the ASCII record separator
//! (0x1E). A single websocket text message may carry several frames. The
//! connection starts with a handshake request from the client, answered by an
//! empty object (or an object with an `error` field) before any other frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{HubError, Result};

pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Server -> client event targets.
pub const RECEIVE_NOTIFICATION: &str = "ReceiveNotification";
pub const UPDATE_UNREAD_COUNT: &str = "UpdateUnreadCount";
pub const NOTIFICATION_READ: &str = "NotificationRead";

/// Client -> server commands.
pub const JOIN_GROUP: &str = "JoinGroup";
pub const LEAVE_GROUP: &str = "LeaveGroup";
pub const MARK_NOTIFICATION_AS_READ: &str = "MarkNotificationAsRead";

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// A method call. From the server this is a pushed event; from the client
    /// a command. `invocation_id` is set when a completion is expected.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl HubMessage {
    pub fn invocation(invocation_id: Option<String>, target: &str, arguments: Vec<Value>) -> Self {
        HubMessage::Invocation {
            invocation_id,
            target: target.to_owned(),
            arguments,
        }
    }

    pub fn completion(invocation_id: &str, outcome: std::result::Result<Value, String>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        HubMessage::Completion {
            invocation_id: invocation_id.to_owned(),
            result,
            error,
        }
    }

    /// Encode as a single frame, including the trailing record separator.
    pub fn to_frame(&self) -> Result<String> {
        let raw = match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => RawFrame {
                kind: TYPE_INVOCATION,
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..RawFrame::default()
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => RawFrame {
                kind: TYPE_COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                result: result.clone(),
                error: error.clone(),
                ..RawFrame::default()
            },
            HubMessage::Ping => RawFrame {
                kind: TYPE_PING,
                ..RawFrame::default()
            },
            HubMessage::Close {
                error,
                allow_reconnect,
            } => RawFrame {
                kind: TYPE_CLOSE,
                error: error.clone(),
                allow_reconnect: Some(*allow_reconnect),
                ..RawFrame::default()
            },
        };

        let mut frame = serde_json::to_string(&raw)?;
        frame.push(RECORD_SEPARATOR);
        Ok(frame)
    }

    /// Decode a single frame with the separator already stripped.
    ///
    /// Returns `Ok(None)` for valid frame types this client does not act on
    /// (stream items, cancellations).
    pub fn from_json(json: &str) -> Result<Option<HubMessage>> {
        let raw: RawFrame = serde_json::from_str(json)?;

        let msg = match raw.kind {
            TYPE_INVOCATION => {
                let Some(target) = raw.target else {
                    return Err(HubError::Decode("invocation without target".to_owned()));
                };
                HubMessage::Invocation {
                    invocation_id: raw.invocation_id,
                    target,
                    arguments: raw.arguments.unwrap_or_default(),
                }
            }
            TYPE_COMPLETION => {
                let Some(invocation_id) = raw.invocation_id else {
                    return Err(HubError::Decode("completion without invocationId".to_owned()));
                };
                HubMessage::Completion {
                    invocation_id,
                    result: raw.result,
                    error: raw.error,
                }
            }
            TYPE_PING => HubMessage::Ping,
            TYPE_CLOSE => HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect.unwrap_or(false),
            },
            other => {
                tracing::trace!("ignoring hub frame of type {other}");
                return Ok(None);
            }
        };

        Ok(Some(msg))
    }
}

/// Split a websocket payload into frames and decode each of them.
pub fn decode_frames(payload: &str) -> Vec<Result<HubMessage>> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|frame| !frame.trim().is_empty())
        .filter_map(|frame| HubMessage::from_json(frame).transpose())
        .collect()
}

pub fn handshake_request() -> String {
    let mut req = serde_json::json!({ "protocol": "json", "version": 1 }).to_string();
    req.push(RECORD_SEPARATOR);
    req
}

/// Parse the first frame of the connection. On success returns whatever
/// followed the handshake response in the same payload.
pub fn parse_handshake_response(payload: &str) -> Result<&str> {
    let Some((response, rest)) = payload.split_once(RECORD_SEPARATOR) else {
        return Err(HubError::Decode("incomplete handshake response".to_owned()));
    };

    let response: HandshakeResponse = serde_json::from_str(response)?;
    if let Some(error) = response.error {
        return Err(HubError::CommandFailed(format!("handshake rejected: {error}")));
    }

    Ok(rest)
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

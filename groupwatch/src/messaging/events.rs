//! Decoding of inbound messaging gateway webhooks.
//!
//! The gateway posts one JSON envelope per event, `{"event", "instance", "data"}`. Only two
//! events matter here: `messages.upsert` (new chat messages) and `connection.update` (the
//! pairing state of an instance). Everything else decodes to [`MessagingEvent::Other`].

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::instances::InstanceStatus;

/// Header carrying the shared secret configured on the gateway's webhook
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

#[derive(Debug, Clone, PartialEq)]
pub enum MessagingEvent {
    Messages {
        instance: String,
        messages: Vec<IncomingMessage>,
    },
    Connection {
        instance: String,
        status: InstanceStatus,
    },
    Other {
        event: String,
    },
}

/// A chat message with its text extracted. Media and reactions carry no text.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub id: String,
    /// Chat the message was posted in; a group JID for group traffic
    pub remote_jid: String,
    /// Author within a group chat
    pub sender_jid: Option<String>,
    pub sender_name: Option<String>,
    pub from_me: bool,
    pub text: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    instance: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKey {
    id: String,
    remote_jid: String,
    #[serde(default)]
    from_me: bool,
    participant: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    key: RawKey,
    push_name: Option<String>,
    message: Option<Value>,
    message_timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RawMessage>),
    One(Box<RawMessage>),
}

#[derive(Debug, Deserialize)]
struct ConnectionData {
    state: String,
}

fn message_text(message: &Value) -> Option<String> {
    let text = message
        .get("conversation")
        .or_else(|| message.pointer("/extendedTextMessage/text"))
        .or_else(|| message.pointer("/imageMessage/caption"))
        .or_else(|| message.pointer("/videoMessage/caption"))?
        .as_str()?;
    (!text.trim().is_empty()).then(|| text.to_string())
}

/// Seconds since the epoch, sent either as a number or a numeric string
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let seconds = match value? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Utc.timestamp_opt(seconds, 0).single()
}

impl From<RawMessage> for IncomingMessage {
    fn from(raw: RawMessage) -> Self {
        let text = raw.message.as_ref().and_then(message_text);
        let sent_at = timestamp(raw.message_timestamp.as_ref()).unwrap_or_else(Utc::now);
        let sender_jid = raw.key.participant.or_else(|| (!raw.key.remote_jid.ends_with("@g.us")).then(|| raw.key.remote_jid.clone()));

        Self {
            id: raw.key.id,
            remote_jid: raw.key.remote_jid,
            sender_jid,
            sender_name: raw.push_name.filter(|name| !name.trim().is_empty()),
            from_me: raw.key.from_me,
            text,
            sent_at,
        }
    }
}

/// Decode a webhook body. Event names are matched case-insensitively with `.` or `_`.
pub fn decode_event(body: &[u8]) -> Result<MessagingEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_slice(body)?;

    match envelope.event.to_ascii_lowercase().replace('_', ".").as_str() {
        "messages.upsert" => {
            let messages = match serde_json::from_value::<OneOrMany>(envelope.data)? {
                OneOrMany::Many(messages) => messages.into_iter().map(IncomingMessage::from).collect(),
                OneOrMany::One(message) => vec![IncomingMessage::from(*message)],
            };
            Ok(MessagingEvent::Messages {
                instance: envelope.instance,
                messages,
            })
        }
        "connection.update" => {
            let data: ConnectionData = serde_json::from_value(envelope.data)?;
            Ok(MessagingEvent::Connection {
                instance: envelope.instance,
                status: InstanceStatus::from_gateway_state(&data.state),
            })
        }
        _ => Ok(MessagingEvent::Other { event: envelope.event }),
    }
}

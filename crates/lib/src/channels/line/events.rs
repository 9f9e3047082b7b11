//! LINE webhook payload: typed event model and decoder.
//!
//! The body is `{"destination": ..., "events": [...]}`. Each record carries a `type`
//! discriminator; message records carry a nested `message.type`. Kinds this responder does
//! not know decode into [`Event::Other`] / [`Message::Unsupported`] instead of failing, so
//! only structural corruption is a [`DecodeError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Decoding failure for an (already authenticated) webhook body.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid webhook body: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("invalid event at index {index}: {source}")]
    InvalidEvent {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("message event at index {index} has an empty replyToken")]
    EmptyReplyToken { index: usize },
}

/// Decoded webhook body. `events` keeps the order of the original payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    /// Bot user id the events were sent to, when present.
    pub destination: Option<String>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    /// Any non-message event (follow, unfollow, postback, ...), kept with its kind for logging.
    Other(OtherEvent),
}

impl Event {
    /// Wire discriminator of this event (`"message"`, `"follow"`, ...).
    pub fn kind(&self) -> &str {
        match self {
            Event::Message(_) => "message",
            Event::Other(o) => &o.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Single-use token correlating a reply with this event.
    pub reply_token: String,
    pub message: Message,
    pub timestamp: Option<i64>,
    pub webhook_event_id: Option<String>,
    pub source: Option<EventSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherEvent {
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(TextMessage),
    /// Image, sticker, location, etc. Carries the wire `type`.
    Unsupported { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    pub text: String,
}

/// Where an event came from (`user`, `group`, or `room`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default, deserialize_with = "lenient")]
    destination: Option<String>,
    events: Vec<Value>,
}

/// Record split into its discriminator and the remaining fields.
#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageEventFields {
    reply_token: String,
    message: Tagged,
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    webhook_event_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    source: Option<EventSource>,
}

/// Optional metadata: a value of the wrong shape reads as absent rather than failing the event.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Decode a webhook body. Events keep their payload order.
pub fn decode_payload(body: &[u8]) -> Result<WebhookPayload, DecodeError> {
    let raw: RawPayload = serde_json::from_slice(body).map_err(DecodeError::Syntax)?;
    let events = raw
        .events
        .into_iter()
        .enumerate()
        .map(|(index, value)| decode_event(index, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(WebhookPayload {
        destination: raw.destination,
        events,
    })
}

fn decode_event(index: usize, value: Value) -> Result<Event, DecodeError> {
    let invalid = |source: serde_json::Error| DecodeError::InvalidEvent { index, source };
    let tagged: Tagged = serde_json::from_value(value).map_err(invalid)?;
    if tagged.kind != "message" {
        return Ok(Event::Other(OtherEvent { kind: tagged.kind }));
    }
    let fields: MessageEventFields =
        serde_json::from_value(Value::Object(tagged.fields)).map_err(invalid)?;
    if fields.reply_token.is_empty() {
        return Err(DecodeError::EmptyReplyToken { index });
    }
    let message = match fields.message.kind.as_str() {
        "text" => Message::Text(
            serde_json::from_value(Value::Object(fields.message.fields)).map_err(invalid)?,
        ),
        _ => Message::Unsupported {
            kind: fields.message.kind,
        },
    };
    Ok(Event::Message(MessageEvent {
        reply_token: fields.reply_token,
        message,
        timestamp: fields.timestamp,
        webhook_event_id: fields.webhook_event_id,
        source: fields.source,
    }))
}

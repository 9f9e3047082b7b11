//! LINE Messaging API channel: webhook verification, event decoding, and echo replies.

mod dispatch;
mod events;
mod reply;
mod signature;
mod webhook;

pub use dispatch::{
    DispatchOutcome, DispatchState, EventDispatcher, ReplyPolicy, ReplyPolicyError,
    MAX_MESSAGES_PER_REPLY,
};
pub use events::{
    decode_payload, DecodeError, Event, EventSource, Message, MessageEvent,
    OtherEvent, TextMessage, WebhookPayload,
};
pub use reply::{LineReplyClient, OutboundMessage, ReplyError, ReplyGateway};
pub use signature::{sign, validate_signature, SIGNATURE_HEADER};
pub use webhook::{LineWebhook, RawRequest};

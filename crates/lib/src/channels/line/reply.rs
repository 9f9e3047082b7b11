//! Reply capability: send messages against a single-use reply token.

use async_trait::async_trait;
use serde::Serialize;

const DEFAULT_API_BASE: &str = "https://api.line.me";

/// Outbound message for the reply API (`{"type":"text","text":...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Text { text: String },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundMessage::Text { text: text.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("line reply request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("line reply api error: {status} {body}")]
    Api { status: u16, body: String },
}

/// Sends reply messages for one event. Implemented over HTTP by [`LineReplyClient`]; tests use fakes.
#[async_trait]
pub trait ReplyGateway: Send + Sync {
    async fn reply(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<(), ReplyError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [OutboundMessage],
}

/// Client for the LINE Messaging API reply endpoint.
#[derive(Clone)]
pub struct LineReplyClient {
    base_url: String,
    channel_token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for LineReplyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReplyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LineReplyClient {
    pub fn new(channel_token: String, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            base_url,
            channel_token,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReplyGateway for LineReplyClient {
    /// POST /v2/bot/message/reply
    async fn reply(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<(), ReplyError> {
        let url = format!("{}/v2/bot/message/reply", self.base_url);
        let body = ReplyRequest {
            reply_token,
            messages,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.channel_token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ReplyError::Api { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_request_wire_shape() {
        let messages = vec![OutboundMessage::text("hi"), OutboundMessage::text("hi")];
        let req = ReplyRequest {
            reply_token: "t1",
            messages: &messages,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "replyToken": "t1",
                "messages": [
                    {"type": "text", "text": "hi"},
                    {"type": "text", "text": "hi"}
                ]
            })
        );
    }

    #[test]
    fn base_url_defaults_and_trims() {
        assert_eq!(
            LineReplyClient::new("tok".into(), None).base_url(),
            "https://api.line.me"
        );
        assert_eq!(
            LineReplyClient::new("tok".into(), Some("http://127.0.0.1:9000/".into())).base_url(),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn debug_does_not_print_token() {
        let client = LineReplyClient::new("super-secret-token".into(), None);
        assert!(!format!("{:?}", client).contains("super-secret-token"));
    }
}

//! Webhook pipeline: signature check, decode, dispatch.

use crate::channels::line::dispatch::{DispatchOutcome, EventDispatcher, ReplyPolicy};
use crate::channels::line::events::decode_payload;
use crate::channels::line::reply::ReplyGateway;
use crate::channels::line::signature::{validate_signature, SIGNATURE_HEADER};
use crate::config::LineCredentials;
use axum::body::Bytes;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Inbound request as received: headers (case-insensitive lookup) and the raw body bytes.
#[derive(Debug, Clone)]
pub struct RawRequest {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl RawRequest {
    pub fn new<I, K, V>(headers: I, body: impl Into<Bytes>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Build from an HTTP header map. Header values that are not visible ASCII are dropped.
    pub fn from_http(headers: &HeaderMap, body: Bytes) -> Self {
        Self::new(
            headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v.to_string()))),
            body,
        )
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// The LINE webhook responder: owns the channel secret, the dispatcher, and the reply capability.
pub struct LineWebhook {
    channel_secret: String,
    dispatcher: EventDispatcher,
    gateway: Arc<dyn ReplyGateway>,
}

impl LineWebhook {
    pub fn new(
        credentials: &LineCredentials,
        policy: ReplyPolicy,
        gateway: Arc<dyn ReplyGateway>,
    ) -> Self {
        Self {
            channel_secret: credentials.channel_secret.clone(),
            dispatcher: EventDispatcher::new(policy),
            gateway,
        }
    }

    /// Authenticate, decode, and answer one webhook request.
    pub async fn handle(&self, request: &RawRequest) -> DispatchOutcome {
        let Some(signature) = request.header(SIGNATURE_HEADER) else {
            log::warn!("line webhook: missing {} header", SIGNATURE_HEADER);
            return DispatchOutcome::AuthenticationFailed;
        };
        if !validate_signature(self.channel_secret.as_bytes(), signature, request.body()) {
            log::warn!("line webhook: signature verification failed");
            return DispatchOutcome::AuthenticationFailed;
        }
        let payload = match decode_payload(request.body()) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("line webhook: {}", e);
                return DispatchOutcome::MalformedPayload;
            }
        };
        log::info!(
            "line webhook: received {} event(s) for {}",
            payload.events.len(),
            payload.destination.as_deref().unwrap_or("<no destination>")
        );
        let outcome = self
            .dispatcher
            .dispatch(&payload.events, self.gateway.as_ref())
            .await;
        if outcome.is_accepted() {
            log::info!("line webhook: accepted");
        } else {
            log::warn!("line webhook: {:?}", outcome);
        }
        outcome
    }
}

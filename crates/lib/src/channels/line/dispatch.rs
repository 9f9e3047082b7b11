//! Event dispatch: fail-fast, single pass over decoded events, replying to text messages.

use crate::channels::line::events::{Event, Message, MessageEvent, TextMessage};
use crate::channels::line::reply::{OutboundMessage, ReplyGateway};
use axum::http::StatusCode;

/// Upper bound on messages in one reply call (platform limit).
pub const MAX_MESSAGES_PER_REPLY: usize = 5;

/// Result of handling one webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    AuthenticationFailed,
    MalformedPayload,
    UnsupportedContent,
    DownstreamFailure(String),
}

impl DispatchOutcome {
    /// 200 on Accepted, 400 on caller errors, 500 on reply failures.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchOutcome::Accepted => StatusCode::OK,
            DispatchOutcome::AuthenticationFailed
            | DispatchOutcome::MalformedPayload
            | DispatchOutcome::UnsupportedContent => StatusCode::BAD_REQUEST,
            DispatchOutcome::DownstreamFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted)
    }
}

/// Dispatch progress. `Processing(i)` means event `i` is next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Processing(usize),
    Accepted,
    Rejected(DispatchOutcome),
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::Accepted | DispatchState::Rejected(_))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplyPolicyError {
    #[error("echoCount must be between 1 and 5, got {0}")]
    EchoCount(usize),
    #[error("replyCallsPerEvent must be at least 1")]
    ReplyCalls,
}

/// How a text message is answered.
///
/// `echo_count` identical text messages go out in one reply call. `reply_calls` repeats that call
/// with the same token; anything above 1 relies on the platform accepting a reused reply token,
/// which it normally rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyPolicy {
    echo_count: usize,
    reply_calls: usize,
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self {
            echo_count: 2,
            reply_calls: 1,
        }
    }
}

impl ReplyPolicy {
    pub fn new(echo_count: usize, reply_calls: usize) -> Result<Self, ReplyPolicyError> {
        if echo_count == 0 || echo_count > MAX_MESSAGES_PER_REPLY {
            return Err(ReplyPolicyError::EchoCount(echo_count));
        }
        if reply_calls == 0 {
            return Err(ReplyPolicyError::ReplyCalls);
        }
        if reply_calls > 1 {
            log::warn!(
                "reply policy reuses each reply token {} times; the platform is expected to reject every call after the first",
                reply_calls
            );
        }
        Ok(Self {
            echo_count,
            reply_calls,
        })
    }

    pub fn echo_count(&self) -> usize {
        self.echo_count
    }

    pub fn reply_calls(&self) -> usize {
        self.reply_calls
    }

    /// Messages sent in each reply call for an incoming text message.
    pub fn messages_for(&self, text: &TextMessage) -> Vec<OutboundMessage> {
        (0..self.echo_count)
            .map(|_| OutboundMessage::text(text.text.clone()))
            .collect()
    }
}

/// Walks events in order and stops at the first one it cannot answer.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    policy: ReplyPolicy,
}

impl EventDispatcher {
    pub fn new(policy: ReplyPolicy) -> Self {
        Self { policy }
    }

    /// Reply to every text message in `events`. Replies already sent are not undone when a later
    /// event fails.
    pub async fn dispatch(&self, events: &[Event], gateway: &dyn ReplyGateway) -> DispatchOutcome {
        let mut state = DispatchState::Idle;
        while !state.is_terminal() {
            state = match state {
                DispatchState::Idle => DispatchState::Processing(0),
                DispatchState::Processing(i) if i == events.len() => DispatchState::Accepted,
                DispatchState::Processing(i) => match self.handle_event(i, &events[i], gateway).await {
                    Ok(()) => DispatchState::Processing(i + 1),
                    Err(outcome) => DispatchState::Rejected(outcome),
                },
                terminal => terminal,
            };
            log::debug!("line dispatch: {:?}", state);
        }
        match state {
            DispatchState::Rejected(outcome) => outcome,
            _ => DispatchOutcome::Accepted,
        }
    }

    async fn handle_event(
        &self,
        index: usize,
        event: &Event,
        gateway: &dyn ReplyGateway,
    ) -> Result<(), DispatchOutcome> {
        let message_event = match event {
            Event::Message(m) => m,
            Event::Other(other) => {
                log::warn!("line dispatch: event {} has unsupported type {:?}", index, other.kind);
                return Err(DispatchOutcome::UnsupportedContent);
            }
        };
        match &message_event.message {
            Message::Text(text) => self.reply_text(index, message_event, text, gateway).await,
            Message::Unsupported { kind } => {
                log::warn!("line dispatch: event {} carries unsupported message type {:?}", index, kind);
                Err(DispatchOutcome::UnsupportedContent)
            }
        }
    }

    async fn reply_text(
        &self,
        index: usize,
        event: &MessageEvent,
        text: &TextMessage,
        gateway: &dyn ReplyGateway,
    ) -> Result<(), DispatchOutcome> {
        let messages = self.policy.messages_for(text);
        for call in 1..=self.policy.reply_calls {
            log::debug!(
                "line dispatch: event {} reply call {}/{} with {} message(s)",
                index,
                call,
                self.policy.reply_calls,
                messages.len()
            );
            if let Err(e) = gateway.reply(&event.reply_token, &messages).await {
                log::warn!("line dispatch: reply for event {} failed on call {}: {}", index, call, e);
                return Err(DispatchOutcome::DownstreamFailure(e.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::line::events::OtherEvent;
    use crate::channels::line::reply::ReplyError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every call; fails the call whose 0-based position is `fail_on`.
    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<(String, Vec<OutboundMessage>)>>,
        fail_on: Option<usize>,
    }

    impl RecordingGateway {
        fn failing_on(call: usize) -> Self {
            Self {
                fail_on: Some(call),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, Vec<OutboundMessage>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyGateway for RecordingGateway {
        async fn reply(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<(), ReplyError> {
            let mut calls = self.calls.lock().unwrap();
            let position = calls.len();
            calls.push((reply_token.to_string(), messages.to_vec()));
            if self.fail_on == Some(position) {
                return Err(ReplyError::Api {
                    status: 400,
                    body: "Invalid reply token".to_string(),
                });
            }
            Ok(())
        }
    }

    fn text_event(token: &str, text: &str) -> Event {
        Event::Message(MessageEvent {
            reply_token: token.to_string(),
            message: Message::Text(TextMessage {
                id: None,
                text: text.to_string(),
            }),
            timestamp: None,
            webhook_event_id: None,
            source: None,
        })
    }

    fn image_event(token: &str) -> Event {
        Event::Message(MessageEvent {
            reply_token: token.to_string(),
            message: Message::Unsupported {
                kind: "image".to_string(),
            },
            timestamp: None,
            webhook_event_id: None,
            source: None,
        })
    }

    #[tokio::test]
    async fn text_event_is_echoed_in_one_call() {
        let gateway = RecordingGateway::default();
        let outcome = EventDispatcher::default()
            .dispatch(&[text_event("t1", "hi")], &gateway)
            .await;
        assert_eq!(outcome, DispatchOutcome::Accepted);
        assert_eq!(
            gateway.calls(),
            vec![(
                "t1".to_string(),
                vec![OutboundMessage::text("hi"), OutboundMessage::text("hi")]
            )]
        );
    }

    #[tokio::test]
    async fn no_events_is_accepted() {
        let gateway = RecordingGateway::default();
        let outcome = EventDispatcher::default().dispatch(&[], &gateway).await;
        assert!(outcome.is_accepted());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_stops_before_next_event() {
        let gateway = RecordingGateway::failing_on(0);
        let events = [text_event("t1", "a"), text_event("t2", "b")];
        let outcome = EventDispatcher::default().dispatch(&events, &gateway).await;
        assert!(matches!(outcome, DispatchOutcome::DownstreamFailure(ref d) if d.contains("Invalid reply token")));
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "t1");
    }

    #[tokio::test]
    async fn unsupported_event_stops_dispatch_after_earlier_replies() {
        let gateway = RecordingGateway::default();
        let events = [
            text_event("t1", "a"),
            Event::Other(OtherEvent {
                kind: "follow".to_string(),
            }),
            text_event("t3", "c"),
        ];
        let outcome = EventDispatcher::default().dispatch(&events, &gateway).await;
        assert_eq!(outcome, DispatchOutcome::UnsupportedContent);
        let tokens: Vec<String> = gateway.calls().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn non_text_message_is_unsupported() {
        let gateway = RecordingGateway::default();
        let outcome = EventDispatcher::default()
            .dispatch(&[image_event("t1"), text_event("t2", "b")], &gateway)
            .await;
        assert_eq!(outcome, DispatchOutcome::UnsupportedContent);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_reply_calls_reuse_the_token() {
        let gateway = RecordingGateway::default();
        let dispatcher = EventDispatcher::new(ReplyPolicy::new(1, 2).unwrap());
        let outcome = dispatcher.dispatch(&[text_event("t1", "hi")], &gateway).await;
        assert!(outcome.is_accepted());
        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(t, m)| t == "t1" && m == &vec![OutboundMessage::text("hi")]));
    }

    #[tokio::test]
    async fn second_call_on_reused_token_failing_is_downstream_failure() {
        let gateway = RecordingGateway::failing_on(1);
        let dispatcher = EventDispatcher::new(ReplyPolicy::new(1, 2).unwrap());
        let outcome = dispatcher
            .dispatch(&[text_event("t1", "a"), text_event("t2", "b")], &gateway)
            .await;
        assert!(matches!(outcome, DispatchOutcome::DownstreamFailure(_)));
        assert_eq!(gateway.calls().len(), 2);
    }

    #[test]
    fn policy_bounds() {
        assert_eq!(ReplyPolicy::new(0, 1), Err(ReplyPolicyError::EchoCount(0)));
        assert_eq!(ReplyPolicy::new(6, 1), Err(ReplyPolicyError::EchoCount(6)));
        assert_eq!(ReplyPolicy::new(2, 0), Err(ReplyPolicyError::ReplyCalls));
        let p = ReplyPolicy::new(5, 1).unwrap();
        assert_eq!((p.echo_count(), p.reply_calls()), (5, 1));
        assert_eq!(ReplyPolicy::default(), ReplyPolicy::new(2, 1).unwrap());
    }

    #[test]
    fn outcome_status_codes() {
        assert_eq!(DispatchOutcome::Accepted.status_code(), StatusCode::OK);
        assert_eq!(DispatchOutcome::AuthenticationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DispatchOutcome::MalformedPayload.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DispatchOutcome::UnsupportedContent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DispatchOutcome::DownstreamFailure("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!DispatchState::Idle.is_terminal());
        assert!(!DispatchState::Processing(3).is_terminal());
        assert!(DispatchState::Accepted.is_terminal());
        assert!(DispatchState::Rejected(DispatchOutcome::UnsupportedContent).is_terminal());
    }
}

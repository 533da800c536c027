//! Pure session transition function
//!
//! Given the same state, context and event it always produces the same
//! result; all I/O happens in the controller executing the effects.

use super::effect::Effect;
use super::event::{ClientEvent, ServerEvent, SessionEvent};
use super::state::{SessionContext, SessionState};
use serde_json::Value;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Rejected transitions; the state is left unchanged
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// Setup while a session is live or connecting
    #[error("session already {0}, skipping setup")]
    AlreadyStarted(SessionState),
    /// Malformed inbound event; the event is dropped
    #[error("{0}")]
    Protocol(String),
    /// Event not meaningful in this state
    #[error("ignoring {event} while {state}")]
    Ignored { state: SessionState, event: &'static str },
}

/// Pure transition function
pub fn transition(
    state: SessionState,
    context: &SessionContext,
    event: SessionEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Setup
        // ============================================================

        // Retrying after a failed negotiation drops the half-built transport first
        (SessionState::Connecting { failed: true }, SessionEvent::SetupRequested) => {
            Ok(TransitionResult::new(SessionState::Connecting { failed: false })
                .with_effect(Effect::ReleaseResources)
                .with_effect(Effect::Connect))
        }

        (SessionState::Idle | SessionState::Closed, SessionEvent::SetupRequested) => {
            Ok(TransitionResult::new(SessionState::Connecting { failed: false })
                .with_effect(Effect::Connect))
        }

        (state, SessionEvent::SetupRequested) => Err(TransitionError::AlreadyStarted(state)),

        (SessionState::Connecting { failed: false }, SessionEvent::Negotiated) => {
            Ok(TransitionResult::new(SessionState::AwaitingChannelOpen))
        }

        // No automatic retry; the caller must set up again
        (SessionState::Connecting { failed: false }, SessionEvent::NegotiationFailed { .. }) => {
            Ok(TransitionResult::new(SessionState::Connecting { failed: true }))
        }

        // ============================================================
        // Channel lifecycle
        // ============================================================

        // Configuration first, then context, before any other traffic
        (SessionState::AwaitingChannelOpen, SessionEvent::ChannelOpened) => {
            Ok(TransitionResult::new(SessionState::Active)
                .with_effect(Effect::Send(ClientEvent::session_update(
                    context.tools.clone(),
                    context.instructions.clone(),
                )))
                .with_effect(Effect::Send(ClientEvent::system_message(
                    context.context.clone(),
                ))))
        }

        (SessionState::AwaitingChannelOpen | SessionState::Active, SessionEvent::ChannelClosed) => {
            Ok(TransitionResult::new(SessionState::Closed).with_effect(Effect::ReleaseResources))
        }

        // ============================================================
        // Inbound server events
        // ============================================================
        (SessionState::Active, SessionEvent::ServerMessage(message)) => {
            server_message(message)
        }

        // ============================================================
        // Context
        // ============================================================
        (SessionState::Active, SessionEvent::ContextChanged) => {
            Ok(TransitionResult::new(SessionState::Active).with_effect(Effect::Send(
                ClientEvent::system_message(context.context.clone()),
            )))
        }

        (SessionState::Active, SessionEvent::ContextPushed { text }) => Ok(
            TransitionResult::new(SessionState::Active)
                .with_effect(Effect::Send(ClientEvent::system_message(text))),
        ),

        // Held value already updated by the caller; nothing to push
        (state, SessionEvent::ContextChanged) => Ok(TransitionResult::new(state)),

        // ============================================================
        // Stop: callable from any state
        // ============================================================
        (_, SessionEvent::StopRequested) => {
            Ok(TransitionResult::new(SessionState::Closed).with_effect(Effect::ReleaseResources))
        }

        (state, event) => Err(TransitionError::Ignored {
            state,
            event: event_name(&event),
        }),
    }
}

fn server_message(message: ServerEvent) -> Result<TransitionResult, TransitionError> {
    let stay = TransitionResult::new(SessionState::Active);
    match message {
        ServerEvent::TranscriptDone { transcript } => {
            Ok(stay.with_effect(Effect::Transcript(transcript)))
        }
        ServerEvent::FunctionCallArgumentsDone {
            name,
            arguments,
            call_id,
        } => {
            if arguments.trim().is_empty() {
                return Err(TransitionError::Protocol(format!(
                    "function call {call_id} ({name}) has no arguments"
                )));
            }
            let arguments: Value = serde_json::from_str(&arguments).map_err(|e| {
                TransitionError::Protocol(format!(
                    "malformed arguments for {name} (call {call_id}): {e}"
                ))
            })?;
            Ok(stay.with_effect(Effect::InvokeFunction {
                call_id,
                name,
                arguments,
            }))
        }
        ServerEvent::Other => Ok(stay),
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::SetupRequested => "setup",
        SessionEvent::StopRequested => "stop",
        SessionEvent::ContextChanged => "context change",
        SessionEvent::ContextPushed { .. } => "context push",
        SessionEvent::Negotiated => "negotiation result",
        SessionEvent::NegotiationFailed { .. } => "negotiation failure",
        SessionEvent::ChannelOpened => "channel open",
        SessionEvent::ChannelClosed => "channel close",
        SessionEvent::ServerMessage(_) => "server message",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionDescriptor;
    use crate::realtime::event::ConversationItem;
    use serde_json::json;

    fn context() -> SessionContext {
        SessionContext {
            instructions: "Be helpful".to_string(),
            context: "User is on the home page".to_string(),
            tools: vec![FunctionDescriptor::new("navigate", "Go somewhere").to_realtime_tool()],
        }
    }

    fn call(name: &str, arguments: &str) -> SessionEvent {
        SessionEvent::ServerMessage(ServerEvent::FunctionCallArgumentsDone {
            name: name.to_string(),
            arguments: arguments.to_string(),
            call_id: "call_1".to_string(),
        })
    }

    #[test]
    fn test_setup_from_idle_connects() {
        let result = transition(SessionState::Idle, &context(), SessionEvent::SetupRequested).unwrap();
        assert_eq!(result.new_state, SessionState::Connecting { failed: false });
        assert_eq!(result.effects, vec![Effect::Connect]);
    }

    #[test]
    fn test_reentrant_setup_rejected() {
        for state in [
            SessionState::Connecting { failed: false },
            SessionState::AwaitingChannelOpen,
            SessionState::Active,
        ] {
            assert_eq!(
                transition(state, &context(), SessionEvent::SetupRequested).unwrap_err(),
                TransitionError::AlreadyStarted(state)
            );
        }
    }

    #[test]
    fn test_failed_negotiation_stays_connecting() {
        let result = transition(
            SessionState::Connecting { failed: false },
            &context(),
            SessionEvent::NegotiationFailed {
                message: "401".to_string(),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, SessionState::Connecting { failed: true });
        assert!(result.effects.is_empty());

        let retry = transition(result.new_state, &context(), SessionEvent::SetupRequested).unwrap();
        assert_eq!(retry.effects, vec![Effect::ReleaseResources, Effect::Connect]);
    }

    #[test]
    fn test_channel_open_sends_config_then_context() {
        let ctx = context();
        let result =
            transition(SessionState::AwaitingChannelOpen, &ctx, SessionEvent::ChannelOpened).unwrap();
        assert_eq!(result.new_state, SessionState::Active);
        assert_eq!(
            result.effects,
            vec![
                Effect::Send(ClientEvent::session_update(ctx.tools.clone(), "Be helpful")),
                Effect::Send(ClientEvent::system_message("User is on the home page")),
            ]
        );
    }

    #[test]
    fn test_function_call_parses_arguments() {
        let result = transition(SessionState::Active, &context(), call("navigate", r#"{"to":"/x"}"#))
            .unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::InvokeFunction {
                call_id: "call_1".to_string(),
                name: "navigate".to_string(),
                arguments: json!({"to": "/x"}),
            }]
        );
    }

    #[test]
    fn test_malformed_or_missing_arguments_are_protocol_errors() {
        for arguments in ["{oops", "", "   "] {
            assert!(matches!(
                transition(SessionState::Active, &context(), call("navigate", arguments)),
                Err(TransitionError::Protocol(_))
            ));
        }
    }

    #[test]
    fn test_transcript_and_other_events() {
        let result = transition(
            SessionState::Active,
            &context(),
            SessionEvent::ServerMessage(ServerEvent::TranscriptDone {
                transcript: "hello".to_string(),
            }),
        )
        .unwrap();
        assert_eq!(result.effects, vec![Effect::Transcript("hello".to_string())]);

        let other = transition(
            SessionState::Active,
            &context(),
            SessionEvent::ServerMessage(ServerEvent::Other),
        )
        .unwrap();
        assert!(other.effects.is_empty());
    }

    #[test]
    fn test_server_message_before_active_ignored() {
        assert!(matches!(
            transition(SessionState::AwaitingChannelOpen, &context(), call("navigate", "{}")),
            Err(TransitionError::Ignored { .. })
        ));
    }

    #[test]
    fn test_context_push_only_when_active() {
        let active = transition(SessionState::Active, &context(), SessionEvent::ContextChanged).unwrap();
        match &active.effects[..] {
            [Effect::Send(ClientEvent::ConversationItemCreate {
                item: ConversationItem::Message { role, .. },
            })] => assert_eq!(role, "system"),
            other => panic!("unexpected effects {other:?}"),
        }

        let idle = transition(SessionState::Idle, &context(), SessionEvent::ContextChanged).unwrap();
        assert_eq!(idle.new_state, SessionState::Idle);
        assert!(idle.effects.is_empty());
    }

    #[test]
    fn test_stop_from_any_state_releases() {
        for state in [
            SessionState::Idle,
            SessionState::Connecting { failed: true },
            SessionState::AwaitingChannelOpen,
            SessionState::Active,
            SessionState::Closed,
        ] {
            let result = transition(state, &context(), SessionEvent::StopRequested).unwrap();
            assert_eq!(result.new_state, SessionState::Closed);
            assert_eq!(result.effects, vec![Effect::ReleaseResources]);
        }
    }
}

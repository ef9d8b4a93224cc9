//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::transport::TransportError;
use crate::wire::{StreamEvent, ToolError};
use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Map};

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("test-conv")
}

fn user_message(text: &str, n: u64) -> Event {
    Event::UserMessage {
        text: text.to_string(),
        user_message_id: format!("user-{n}"),
        assistant_message_id: format!("assistant-{n}"),
        timestamp: Utc::now(),
    }
}

/// Apply an event, keeping the old state when it is ignored
fn apply(state: &ConversationState, event: Event) -> ConversationState {
    match transition(state, &test_context(), event) {
        Ok(result) => result.new_state,
        Err(_) => state.clone(),
    }
}

fn open_turn_state() -> ConversationState {
    apply(&ConversationState::new(), user_message("question", 0))
}

fn current_turn(state: &ConversationState) -> TurnId {
    state.turn.as_ref().map_or(TurnId(state.next_turn), |t| t.id)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof!["[a-zA-Z0-9 .,!?]{0,20}", "[א-ת ]{0,12}", "\\PC{0,8}"]
}

fn arb_tool_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("check_medication_stock".to_string()),
        Just("list_user_prescriptions".to_string()),
        Just("request_prescription_refill".to_string()),
        Just("get_medication_by_name".to_string()),
    ]
}

fn arb_call_id() -> impl Strategy<Value = String> {
    (1u8..5).prop_map(|n| format!("call_{n}"))
}

fn arb_tool_result(id: String) -> impl Strategy<Value = StreamEvent> {
    (arb_tool_name(), any::<bool>()).prop_map(move |(name, success)| StreamEvent::ToolResult {
        tool_call_id: id.clone(),
        name,
        success,
        result: success.then(|| json!({"ok": true})),
        error: (!success).then(|| ToolError::new("NOT_FOUND", "missing")),
    })
}

fn arb_stream_event() -> impl Strategy<Value = StreamEvent> {
    prop_oneof![
        4 => arb_text().prop_map(StreamEvent::token),
        2 => (arb_call_id(), arb_tool_name()).prop_map(|(id, name)| StreamEvent::ToolCall {
            id,
            name,
            arguments: Map::new(),
        }),
        2 => arb_call_id().prop_flat_map(arb_tool_result),
        1 => arb_text().prop_map(|content| StreamEvent::FinalMessage {
            content,
            tool_calls: vec![],
            tool_results: vec![],
        }),
        1 => arb_text().prop_map(|message| StreamEvent::error(message, None)),
    ]
}

/// Event sequences mixing user intents with events for current and stale turns
#[derive(Debug, Clone)]
enum Step {
    Send(String),
    Opened,
    Stream(StreamEvent),
    StaleStream(StreamEvent),
    Failed,
    Abort,
    Clear,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => arb_text().prop_map(Step::Send),
        1 => Just(Step::Opened),
        6 => arb_stream_event().prop_map(Step::Stream),
        1 => arb_stream_event().prop_map(Step::StaleStream),
        1 => Just(Step::Failed),
        1 => Just(Step::Abort),
        1 => Just(Step::Clear),
    ]
}

fn to_event(state: &ConversationState, step: Step, n: u64) -> Event {
    let turn = current_turn(state);
    match step {
        Step::Send(text) => user_message(&text, n),
        Step::Opened => Event::TransportOpened { turn },
        Step::Stream(event) => Event::Stream { turn, event },
        Step::StaleStream(event) => Event::Stream {
            turn: TurnId(turn.0.wrapping_add(7)),
            event,
        },
        Step::Failed => Event::TransportFailed {
            turn,
            error: TransportError::network("reset"),
        },
        Step::Abort => Event::Abort,
        Step::Clear => Event::Clear,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_tokens_concatenate(tokens in prop::collection::vec(arb_text(), 0..20)) {
        let mut state = open_turn_state();
        for token in &tokens {
            state = apply(&state, Event::Stream {
                turn: TurnId(0),
                event: StreamEvent::token(token.clone()),
            });
        }
        prop_assert_eq!(&state.open_message().unwrap().content, &tokens.concat());
    }

    #[test]
    fn prop_final_message_overrides_tokens(
        tokens in prop::collection::vec(arb_text(), 0..10),
        content in arb_text(),
    ) {
        let mut state = open_turn_state();
        for token in tokens {
            state = apply(&state, Event::Stream { turn: TurnId(0), event: StreamEvent::token(token) });
        }
        state = apply(&state, Event::Stream {
            turn: TurnId(0),
            event: StreamEvent::FinalMessage { content: content.clone(), tool_calls: vec![], tool_results: vec![] },
        });
        let last = state.messages.last().unwrap();
        prop_assert_eq!(&last.content, &content);
        prop_assert_eq!(last.status, MessageStatus::Complete);
        prop_assert!(!state.is_streaming);
    }

    #[test]
    fn prop_tool_result_sets_status(success in any::<bool>(), name in arb_tool_name()) {
        let mut state = open_turn_state();
        state = apply(&state, Event::Stream {
            turn: TurnId(0),
            event: StreamEvent::ToolCall { id: "call_1".into(), name: name.clone(), arguments: Map::new() },
        });
        state = apply(&state, Event::Stream {
            turn: TurnId(0),
            event: StreamEvent::ToolResult {
                tool_call_id: "call_1".into(),
                name,
                success,
                result: None,
                error: None,
            },
        });
        let expected = if success { ToolStatus::Success } else { ToolStatus::Error };
        prop_assert_eq!(state.tool_activity.calls[0].status, expected);
        let result = &state.tool_activity.results[0];
        prop_assert_eq!(result.result.is_some(), success);
        prop_assert_eq!(result.error.is_some(), !success);
    }

    #[test]
    fn prop_unmatched_result_leaves_calls_unchanged(event in arb_call_id().prop_flat_map(arb_tool_result)) {
        let mut state = open_turn_state();
        state = apply(&state, Event::Stream {
            turn: TurnId(0),
            event: StreamEvent::ToolCall { id: "other".into(), name: "get_user_profile".into(), arguments: Map::new() },
        });
        let before = state.clone();
        let result = transition(&state, &test_context(), Event::Stream { turn: TurnId(0), event });
        prop_assert!(matches!(result, Err(TransitionError::UnknownToolCall(_))));
        prop_assert_eq!(before.tool_activity, state.tool_activity);
    }

    #[test]
    fn prop_send_while_streaming_is_noop(text in "[a-z]{1,10}", steps in prop::collection::vec(arb_stream_event(), 0..5)) {
        let mut state = open_turn_state();
        for event in steps.into_iter().filter(|e| !e.is_terminal()) {
            state = apply(&state, Event::Stream { turn: TurnId(0), event });
        }
        let result = transition(&state, &test_context(), user_message(&text, 1));
        prop_assert_eq!(result.unwrap_err(), TransitionError::TurnInProgress);
    }

    #[test]
    fn prop_events_after_clear_are_dropped(events in prop::collection::vec(arb_stream_event(), 1..10)) {
        let state = apply(&open_turn_state(), Event::Clear);
        for event in events {
            let result = transition(&state, &test_context(), Event::Stream { turn: TurnId(0), event });
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_invariants_hold_for_any_sequence(steps in prop::collection::vec(arb_step(), 0..40)) {
        let mut state = ConversationState::new();
        let mut last_turn = 0u64;
        for (n, step) in steps.into_iter().enumerate() {
            let event = to_event(&state, step, n as u64);
            state = apply(&state, event);

            prop_assert_eq!(state.is_streaming, state.turn.is_some());
            prop_assert!(state.next_turn >= last_turn);
            last_turn = state.next_turn;

            let open = state.messages.iter().filter(|m| m.is_open()).count();
            prop_assert!(open <= 1);
            prop_assert_eq!(open == 1, state.turn.is_some());

            // Every result follows a call with the same id
            for (i, result) in state.tool_activity.results.iter().enumerate() {
                prop_assert!(state.tool_activity.calls.iter().any(|c| c.id == result.tool_call_id), "result {} has no call", i);
            }
        }
    }
}

#[test]
fn test_clear_is_idempotent_on_empty_state() {
    let state = ConversationState::new();
    let once = apply(&state, Event::Clear);
    let twice = apply(&once, Event::Clear);
    assert_eq!(once, state);
    assert_eq!(twice, state);
}

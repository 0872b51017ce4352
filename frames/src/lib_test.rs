use super::*;
use serde_json::json;

fn chat(text: &str) -> ChatUpdate {
    match decode_inbound(text).expect("decode should succeed") {
        InboundFrame::Chat(update) => update,
        InboundFrame::Step(step) => panic!("expected chat update, got step {step:?}"),
    }
}

#[test]
fn encode_outbound_writes_message_object() {
    let text = encode_outbound(&OutboundFrame::new("how did I sleep?"));
    let value: Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(value, json!({"message": "how did I sleep?"}));
}

#[test]
fn decode_inbound_classifies_step_frame() {
    let frame = decode_inbound(r#"{"type":"step","step":3,"description":"thinking"}"#)
        .expect("decode should succeed");
    assert_eq!(
        frame,
        InboundFrame::Step(StepProgress { step_index: 3, description: "thinking".to_owned() })
    );
}

#[test]
fn decode_inbound_step_defaults_missing_fields() {
    let frame = decode_inbound(r#"{"type":"step"}"#).expect("decode should succeed");
    assert_eq!(frame, InboundFrame::Step(StepProgress::default()));
}

#[test]
fn decode_inbound_step_coerces_unusable_index_to_zero() {
    for raw in [r#""three""#, "-2", "null", "0.4"] {
        let text = format!(r#"{{"type":"step","step":{raw},"description":"d"}}"#);
        let InboundFrame::Step(step) = decode_inbound(&text).expect("decode") else {
            panic!("expected step frame for {raw}");
        };
        assert_eq!(step.step_index, 0, "step {raw}");
    }
}

#[test]
fn decode_inbound_step_accepts_float_index() {
    let InboundFrame::Step(step) =
        decode_inbound(r#"{"type":"step","step":2.0}"#).expect("decode")
    else {
        panic!("expected step frame");
    };
    assert_eq!(step.step_index, 2);
}

#[test]
fn decode_inbound_passes_chat_update_through_verbatim() {
    let raw = json!({
        "history": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello", "steps": 2, "id": "m-2", "name": "coach", "mood": "calm"}
        ],
        "conversation_id": "abc",
        "unexpected": {"nested": true}
    });
    let update = chat(&raw.to_string());
    assert_eq!(update.as_value(), &raw);
    assert_eq!(update.conversation_id(), Some("abc"));
    assert_eq!(update.error(), None);
}

#[test]
fn decode_inbound_other_type_is_chat_update() {
    let update = chat(r#"{"type":"status","history":[]}"#);
    assert_eq!(update.as_value()["type"], "status");
}

#[test]
fn decode_inbound_unrecognized_shape_is_not_an_error() {
    let update = chat("42");
    assert_eq!(update.into_value(), json!(42));

    let update = chat(r#"{"foo":"bar"}"#);
    assert_eq!(update.conversation_id(), None);
    assert!(update.history().expect("missing history is empty").is_empty());
}

#[test]
fn decode_inbound_rejects_unparsable_text() {
    let err = decode_inbound("{not json").expect_err("should fail");
    assert!(matches!(err, CodecError::Malformed(_)));
}

#[test]
fn history_keeps_optional_and_unknown_fields() {
    let update = chat(
        r#"{"conversation_id":"c1","history":[{"role":"assistant","content":"ok","steps":4,"name":"coach","mood":"calm"}]}"#,
    );
    let history = update.history().expect("history");
    assert_eq!(history.len(), 1);
    let entry = &history[0];
    assert_eq!(entry.role, "assistant");
    assert_eq!(entry.content, "ok");
    assert_eq!(entry.steps, Some(4));
    assert_eq!(entry.name.as_deref(), Some("coach"));
    assert_eq!(entry.id, None);
    assert_eq!(entry.extra.get("mood"), Some(&json!("calm")));
}

#[test]
fn history_reports_entries_missing_required_fields() {
    let update = chat(r#"{"history":[{"role":"user"}]}"#);
    let err = update.history().expect_err("content is required");
    assert!(matches!(err, CodecError::History(_)));
}

#[test]
fn chat_update_exposes_server_error() {
    let update = chat(r#"{"history":[],"conversation_id":"c1","error":"model unavailable"}"#);
    assert_eq!(update.error(), Some("model unavailable"));
}

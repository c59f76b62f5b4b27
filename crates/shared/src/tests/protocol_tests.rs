use super::*;
use serde_json::json;

#[test]
fn blank_null_and_empty_object_frames_carry_nothing() {
    assert!(Frame::decode("").expect("blank").is_none());
    assert!(Frame::decode("   \n").expect("whitespace").is_none());
    assert!(Frame::decode("null").expect("null").is_none());
    assert!(Frame::decode("{}").expect("empty object").is_none());
}

#[test]
fn decoded_events_keep_wire_order() {
    let frame = Frame::decode(r#"{"progressbar.step": 40, "echo": "a\n", "progressbar.clear": null}"#)
        .expect("decode")
        .expect("frame");

    let names: Vec<&str> = frame.events().map(|(name, _)| name).collect();
    assert_eq!(names, vec![PROGRESSBAR_STEP, ECHO, PROGRESSBAR_CLEAR]);
}

#[test]
fn non_object_frames_are_rejected() {
    assert!(matches!(
        Frame::decode("[1, 2]"),
        Err(ProtocolError::NotAnObject("array"))
    ));
    assert!(matches!(
        Frame::decode("\"echo\""),
        Err(ProtocolError::NotAnObject("string"))
    ));
    assert!(matches!(
        Frame::decode("{not json"),
        Err(ProtocolError::InvalidJson(_))
    ));
}

#[test]
fn typed_payloads_decode_from_raw_values() {
    let text = decode_payload::<Echo>(&json!("hello")).expect("echo payload");
    assert_eq!(text, "hello");

    let step = decode_payload::<ProgressStep>(&json!(37)).expect("step payload");
    assert_eq!(step, 37.0);

    decode_payload::<ProgressInit>(&Value::Null).expect("init ignores null");
    decode_payload::<ProgressClear>(&json!({"anything": true})).expect("clear ignores body");

    assert!(decode_payload::<ProgressStep>(&json!("forty")).is_err());
}

#[test]
fn outbound_frames_encode_as_objects() {
    let mut frame = Frame::new().with_event("cancel", json!({"id": 3}));
    frame.push_typed::<Echo>(&"bye".to_string()).expect("push");

    let encoded = frame.encode().expect("encode");
    assert_eq!(encoded, r#"{"cancel":{"id":3},"echo":"bye"}"#);
    assert_eq!(frame.len(), 2);
}

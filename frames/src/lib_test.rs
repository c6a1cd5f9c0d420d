use super::*;

#[test]
fn binary_frame_header_is_big_endian() {
    let bytes = encode_binary_frame(0x0102_0304, 0x0506_0708, &[0xaa, 0xbb]).expect("encode");

    assert_eq!(bytes.len(), HEADER_SIZE + 2);
    assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&bytes[4..8], &[0x05, 0x06, 0x07, 0x08]);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
    assert_eq!(&bytes[12..], &[0xaa, 0xbb]);
}

#[test]
fn binary_frame_round_trips() {
    let payload = b"hello frame".to_vec();
    let bytes = encode_binary_frame(u32::MAX, 7, &payload).expect("encode");
    let frame = decode_binary_frame(&bytes).expect("decode");
    assert_eq!(frame, BinaryFrame { session: u32::MAX, type_id: 7, payload });
}

#[test]
fn binary_frame_with_empty_payload_is_header_only() {
    let bytes = encode_binary_frame(1, 2, &[]).expect("encode");
    assert_eq!(bytes.len(), HEADER_SIZE);

    let frame = decode_binary_frame_strict(&bytes).expect("decode");
    assert!(frame.payload.is_empty());
}

#[test]
fn decode_rejects_buffers_shorter_than_header() {
    let err = decode_binary_frame(&[0u8; 11]).expect_err("short buffer should fail");
    assert!(matches!(err, FramingError::Truncated { len: 11 }));

    let err = decode_binary_frame_strict(&[]).expect_err("empty buffer should fail");
    assert!(matches!(err, FramingError::Truncated { len: 0 }));
}

#[test]
fn lenient_decode_ignores_declared_length() {
    let mut bytes = encode_binary_frame(3, 4, &[1, 2, 3]).expect("encode");
    bytes.push(4);

    let frame = decode_binary_frame(&bytes).expect("lenient decode");
    assert_eq!(frame.payload, vec![1, 2, 3, 4]);
}

#[test]
fn strict_decode_rejects_length_mismatch() {
    let mut bytes = encode_binary_frame(3, 4, &[1, 2, 3]).expect("encode");
    bytes.push(4);

    let err = decode_binary_frame_strict(&bytes).expect_err("mismatch should fail");
    assert!(matches!(err, FramingError::LengthMismatch { declared: 3, actual: 4 }));
}

#[test]
fn text_frame_serializes_exactly_three_fields() {
    let frame = TextFrame { name: "chat".to_owned(), session: 1, data: serde_json::json!({"msg": "hi"}) };
    let text = encode_text_frame(&frame).expect("encode");
    let value: Value = serde_json::from_str(&text).expect("json");

    assert_eq!(value, serde_json::json!({"name": "chat", "session": 1, "data": {"msg": "hi"}}));
}

#[test]
fn text_frame_without_data_decodes_as_null() {
    let frame = decode_text_frame(r#"{"name":"tick","session":9}"#).expect("decode");
    assert_eq!(frame.name, "tick");
    assert_eq!(frame.session, 9);
    assert_eq!(frame.data, Value::Null);
}

#[test]
fn text_frame_without_session_decodes_as_zero() {
    let frame = decode_text_frame(r#"{"name":"notice","data":{"x":1}}"#).expect("decode");
    assert_eq!(frame.session, 0);
    assert_eq!(frame.data, serde_json::json!({"x": 1}));
}

#[test]
fn text_frame_rejects_missing_name() {
    let err = decode_text_frame(r#"{"session":3,"data":{}}"#).expect_err("name is required");
    assert!(matches!(err, FramingError::Text(_)));
}

#[test]
fn text_frame_rejects_negative_session() {
    assert!(decode_text_frame(r#"{"name":"tick","session":-1,"data":null}"#).is_err());
}

#[test]
fn struct_payload_preserves_nested_values() {
    let value = serde_json::json!({
        "rows": [{"id": 1.0, "name": "a"}, {"id": 2.0, "name": "b"}],
        "meta": {"next": null, "ok": true}
    });
    let decoded = decode_struct_payload(&encode_struct_payload(&value)).expect("decode");
    assert_eq!(decoded, value);
}

#[test]
fn struct_payload_normalizes_integers_to_floats() {
    let decoded = decode_struct_payload(&encode_struct_payload(&serde_json::json!({"n": 1}))).expect("decode");
    assert_eq!(decoded.get("n"), Some(&serde_json::json!(1.0)));
}

#[test]
fn empty_struct_payload_decodes_as_empty_object() {
    assert_eq!(decode_struct_payload(&[]).expect("decode"), serde_json::json!({}));
}

#[test]
fn struct_payload_rejects_malformed_bytes() {
    let err = decode_struct_payload(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, FramingError::Payload(_)));
}

#[test]
fn struct_payload_converts_nan_to_null() {
    let wire = prost_types::Value { kind: Some(prost_types::value::Kind::NumberValue(f64::NAN)) };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    assert_eq!(decode_struct_payload(&bytes).expect("decode"), Value::Null);
}

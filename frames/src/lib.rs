//! Wire codecs for the multiplexed socket client.
//!
//! Two independent encodings share one logical envelope (`name`, `session`,
//! `data`):
//!
//! - Text frames are a JSON object with exactly those three fields.
//! - Binary frames are a fixed 12-byte header followed by a payload produced
//!   by the codec registered for the frame's numeric type id.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────┐
//! │ Session  │ Type ID  │ Length   │ Payload             │
//! │ u32 BE   │ u32 BE   │ u32 BE   │ `Length` bytes      │
//! └──────────┴──────────┴──────────┴─────────────────────┘
//! ```
//!
//! Everything here is pure. The struct payload helpers carry dynamic JSON
//! values as `google.protobuf.Value` so untyped messages still travel as
//! protobuf on the binary path.

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Size of the binary frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Error returned by the frame decoders.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// The buffer is shorter than the fixed binary header.
    #[error("frame truncated: {len} bytes, header needs 12")]
    Truncated { len: usize },
    /// The declared payload length disagrees with the bytes that followed it.
    #[error("frame length mismatch: header declares {declared} bytes, {actual} present")]
    LengthMismatch { declared: u32, actual: usize },
    /// The payload is larger than the `u32` length field can describe.
    #[error("payload too large for frame: {0} bytes")]
    PayloadTooLarge(usize),
    /// A text frame was not valid JSON or lacked a required field.
    #[error("invalid text frame: {0}")]
    Text(#[from] serde_json::Error),
    /// A struct payload could not be decoded as protobuf.
    #[error("failed to decode protobuf payload: {0}")]
    Payload(#[from] prost::DecodeError),
}

// =============================================================================
// BINARY FRAMES
// =============================================================================

/// A decoded binary frame. The payload is still in its serialized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryFrame {
    pub session: u32,
    pub type_id: u32,
    pub payload: Vec<u8>,
}

/// Encode a binary frame: 12-byte header, then the payload.
///
/// # Errors
///
/// Returns [`FramingError::PayloadTooLarge`] when `payload` does not fit the
/// `u32` length field.
pub fn encode_binary_frame(session: u32, type_id: u32, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let len = u32::try_from(payload.len()).map_err(|_| FramingError::PayloadTooLarge(payload.len()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&session.to_be_bytes());
    out.extend_from_slice(&type_id.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode a binary frame, taking every byte after the header as payload.
///
/// The declared length field is read but not checked; use
/// [`decode_binary_frame_strict`] when the two must agree.
///
/// # Errors
///
/// Returns [`FramingError::Truncated`] for buffers shorter than the header.
pub fn decode_binary_frame(buf: &[u8]) -> Result<BinaryFrame, FramingError> {
    let (session, type_id, _) = read_header(buf)?;
    Ok(BinaryFrame { session, type_id, payload: buf[HEADER_SIZE..].to_vec() })
}

/// Decode a binary frame and require the declared length to match the
/// number of bytes after the header.
///
/// # Errors
///
/// Returns [`FramingError::Truncated`] for buffers shorter than the header and
/// [`FramingError::LengthMismatch`] when the length field is wrong.
pub fn decode_binary_frame_strict(buf: &[u8]) -> Result<BinaryFrame, FramingError> {
    let (session, type_id, declared) = read_header(buf)?;
    let actual = buf.len() - HEADER_SIZE;
    if usize::try_from(declared).ok() != Some(actual) {
        return Err(FramingError::LengthMismatch { declared, actual });
    }
    Ok(BinaryFrame { session, type_id, payload: buf[HEADER_SIZE..].to_vec() })
}

fn read_header(buf: &[u8]) -> Result<(u32, u32, u32), FramingError> {
    if buf.len() < HEADER_SIZE {
        return Err(FramingError::Truncated { len: buf.len() });
    }
    let word = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    Ok((word(0), word(4), word(8)))
}

// =============================================================================
// TEXT FRAMES
// =============================================================================

/// A message on the text wire: exactly `name`, `session` and `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextFrame {
    /// Message type name, e.g. `"chat"`.
    pub name: String,
    /// Correlation id chosen by the client and echoed by the peer. Pushes
    /// that omit it decode as 0, which no call ever uses.
    #[serde(default)]
    pub session: u32,
    /// Arbitrary JSON payload. Absent data decodes as `null`.
    #[serde(default)]
    pub data: Value,
}

/// Serialize a text frame to its JSON string form.
///
/// # Errors
///
/// Propagates `serde_json` failures (non-string map keys in `data`).
pub fn encode_text_frame(frame: &TextFrame) -> Result<String, FramingError> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse a text frame from JSON.
///
/// # Errors
///
/// Returns [`FramingError::Text`] for malformed JSON, a missing `name`, or a
/// `session` outside the `u32` range.
pub fn decode_text_frame(text: &str) -> Result<TextFrame, FramingError> {
    Ok(serde_json::from_str(text)?)
}

// =============================================================================
// STRUCT PAYLOADS
// =============================================================================

/// Encode an arbitrary JSON value as a protobuf `google.protobuf.Value`.
#[must_use]
pub fn encode_struct_payload(value: &Value) -> Vec<u8> {
    let wire = json_to_proto_value(value);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Writing into a growable Vec cannot hit `BufferTooSmall`.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode a protobuf `google.protobuf.Value` back into JSON.
///
/// An empty buffer decodes as an empty object, mirroring what the encoder
/// produces for `{}` payloads from peers that omit the field entirely.
///
/// # Errors
///
/// Returns [`FramingError::Payload`] for malformed protobuf bytes.
pub fn decode_struct_payload(bytes: &[u8]) -> Result<Value, FramingError> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let wire = prost_types::Value::decode(bytes)?;
    Ok(proto_to_json_value(&wire))
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32),
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v.iter().map(|(k, v)| (k.clone(), json_to_proto_value(v))).collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => {
            serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number)
        }
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => Value::Array(v.values.iter().map(proto_to_json_value).collect()),
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

//! View keys and their binary encoding.
//!
//! View keys are structured JSON values (scalars and arrays). They are
//! stored encoded so that bytewise BLOB comparison in SQLite matches the
//! structured collation order: null < booleans < numbers < strings <
//! arrays, arrays element-wise with shorter prefixes first, and a high
//! sentinel above everything. The empty JSON object is reserved as that
//! sentinel and must not appear as a real key component.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::{json, Value};

const TAG_NULL: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_TRUE: u8 = 0x03;
const TAG_NUMBER: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;
const TAG_HIGH: u8 = 0xFF;

/// The high sentinel: sorts after every other key.
pub fn key_max() -> Value {
    json!({})
}

/// Order-preserving encoding of an f64: flipped sign bit for positives,
/// all bits inverted for negatives.
fn encode_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let ordered = if v.is_sign_negative() {
        !bits
    } else {
        bits ^ (1u64 << 63)
    };
    ordered.to_be_bytes()
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&encode_f64(n.as_f64().unwrap_or(0.0)));
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            for b in s.as_bytes() {
                if *b == 0x00 {
                    out.extend_from_slice(&[0x00, 0xFF]);
                } else {
                    out.push(*b);
                }
            }
            out.extend_from_slice(&[0x00, 0x00]);
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            for item in items {
                encode_into(item, out);
            }
            out.push(0x00);
        }
        // Objects only appear as the high sentinel.
        Value::Object(_) => out.push(TAG_HIGH),
    }
}

/// Encodes a structured key for storage and comparison.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    encode_into(value, &mut out);
    out
}

/// The seven date components every time-ordered view key starts with.
pub fn date_parts(ts: DateTime<Utc>) -> Vec<Value> {
    vec![
        json!(ts.year()),
        json!(ts.month()),
        json!(ts.day()),
        json!(ts.hour()),
        json!(ts.minute()),
        json!(ts.second()),
        json!(ts.timestamp_subsec_millis()),
    ]
}

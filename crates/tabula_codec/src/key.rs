//! Order-preserving index-key encoding.
//!
//! Each component is self-delimiting and compares bytewise in the same
//! order as its value:
//!
//! - tag byte: `0x00` null, `0x01` present (nulls sort first)
//! - integers: big-endian with the sign bit flipped
//! - floats: IEEE bits, negated when negative, sign flipped otherwise;
//!   `-0.0` encodes as `0.0` and every NaN as one NaN above infinity
//! - varchar: bytes with `0x00` escaped as `0x00 0xFF`, ended by `0x00 0x01`
//!
//! Because no component is a prefix of a different component, the encoding
//! of the first `k` values of a key is a byte prefix of exactly the keys that
//! share those values. Prefix scans are therefore plain byte-range scans.

use crate::value::Value;

const NULL_TAG: u8 = 0x00;
const PRESENT_TAG: u8 = 0x01;

/// Appends the key encoding of one value to `out`.
pub fn encode_key_component(value: &Value, out: &mut Vec<u8>) {
    out.push(if value.is_null() { NULL_TAG } else { PRESENT_TAG });
    match value {
        Value::Null => {}
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::SmallInt(v) => out.extend_from_slice(&((*v as u16) ^ 0x8000).to_be_bytes()),
        Value::Int(v) => out.extend_from_slice(&((*v as u32) ^ 0x8000_0000).to_be_bytes()),
        Value::BigInt(v) | Value::Timestamp(v) => {
            out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
        }
        Value::Float(v) => {
            let bits = canonical_f32(*v).to_bits();
            let ordered = if bits & 0x8000_0000 != 0 {
                !bits
            } else {
                bits ^ 0x8000_0000
            };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        Value::Double(v) => {
            let bits = canonical_f64(*v).to_bits();
            let ordered = if bits & (1 << 63) != 0 {
                !bits
            } else {
                bits ^ (1 << 63)
            };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        Value::Varchar(s) => {
            for &byte in s.as_bytes() {
                out.push(byte);
                if byte == 0x00 {
                    out.push(0xFF);
                }
            }
            out.extend_from_slice(&[0x00, 0x01]);
        }
    }
}

/// Folds `-0.0` into `0.0` and every NaN into one NaN, so values that
/// compare equal get equal keys. NaN sorts above infinity.
fn canonical_f32(v: f32) -> f32 {
    if v.is_nan() {
        f32::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

fn canonical_f64(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Encodes a sequence of values as one composite key.
pub fn encode_key<'a, I>(values: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut out = Vec::new();
    for value in values {
        encode_key_component(value, &mut out);
    }
    out
}

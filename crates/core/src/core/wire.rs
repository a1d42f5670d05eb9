//! Wire formats.
//!
//! Inbound: a multi-part message whose final part is a bracketed ASCII float
//! array, e.g. `[3, 12.5, "0.7", -1e-3]`.
//!
//! Outbound: one binary state frame per published tick.
//!
//! Layout (little endian):
//! - timestamp: f64
//! - count: u64
//! - values: count × f32

use crate::catalog::{Catalog, VarId, TIMESTAMP_SLOT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("empty message")]
    EmptyMessage,
    #[error("payload has no '[' opening the float array")]
    MissingArray,
    #[error("payload is not ASCII text")]
    NotText,
    #[error("cannot convert {token:?} at slot {slot}")]
    BadToken { slot: usize, token: String },
    #[error("expected {expected} values, found {found}")]
    Short { expected: usize, found: usize },
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ',' || c == '"'
}

/// Fill `out` from a bracketed float array, but no more.
///
/// Values past `out.len()` are ignored. Fewer values than `out.len()`, or a
/// token that is not a float, is an error; `out` may then hold a prefix of the
/// payload and must not be committed by the caller.
///
/// Returns the timestamp slot at full `f64` precision when `out` reaches it.
/// Epoch-scale seconds do not survive a round trip through `f32`.
pub fn parse_float_array(payload: &[u8], out: &mut [f32]) -> Result<Option<f64>, WireError> {
    let open = payload
        .iter()
        .position(|&b| b == b'[')
        .ok_or(WireError::MissingArray)?;
    let body = std::str::from_utf8(&payload[open + 1..]).map_err(|_| WireError::NotText)?;
    let body = match body.find(']') {
        Some(close) => &body[..close],
        None => body,
    };

    let mut found = 0;
    let mut timestamp = None;
    for token in body.split(is_separator).filter(|t| !t.is_empty()) {
        if found == out.len() {
            break;
        }
        let bad = || WireError::BadToken {
            slot: found,
            token: token.to_string(),
        };
        out[found] = if found == TIMESTAMP_SLOT {
            let t = token.parse::<f64>().map_err(|_| bad())?;
            timestamp = Some(t);
            t as f32
        } else {
            token.parse::<f32>().map_err(|_| bad())?
        };
        found += 1;
    }

    if found < out.len() {
        return Err(WireError::Short {
            expected: out.len(),
            found,
        });
    }
    Ok(timestamp)
}

/// The final part carries the array; earlier parts are topic echoes.
pub fn payload_part<P: AsRef<[u8]>>(parts: &[P]) -> Result<&[u8], WireError> {
    parts
        .last()
        .map(|p| p.as_ref())
        .ok_or(WireError::EmptyMessage)
}

/// Decode a frame message into `out` (frame-local order); see [`parse_float_array`].
pub fn decode_frame_message<P: AsRef<[u8]>>(parts: &[P], out: &mut [f32]) -> Result<Option<f64>, WireError> {
    parse_float_array(payload_part(parts)?, out)
}

// ─────────────────────────────────────────────────────────────────────────
// Outbound state frames
// ─────────────────────────────────────────────────────────────────────────

/// Text sent once to every new stream consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub mapping: BTreeMap<String, VarId>,
    pub sample_rate_msec: u64,
}

impl Welcome {
    pub fn new(catalog: &Catalog, sample_rate_msec: u64) -> Self {
        Self {
            mapping: catalog
                .uuid_mapping()
                .map(|(uuid, id)| (uuid.to_string(), id))
                .collect(),
            sample_rate_msec,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn write_u64_le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f32_le<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64_le<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_f32_le<R: Read>(r: &mut R) -> io::Result<f32> {
    Ok(f32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f64_le<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn state_frame_len(count: usize) -> usize {
    8 + 8 + 4 * count
}

pub fn write_state_frame<W: Write>(w: &mut W, timestamp: f64, values: &[f32]) -> io::Result<()> {
    write_f64_le(w, timestamp)?;
    write_u64_le(w, values.len() as u64)?;
    for &v in values {
        write_f32_le(w, v)?;
    }
    Ok(())
}

pub fn encode_state_frame(timestamp: f64, values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(state_frame_len(values.len()));
    // Writing into a Vec cannot fail.
    let _ = write_state_frame(&mut buf, timestamp, values);
    buf
}

/// Consumer-side decode of [`encode_state_frame`].
pub fn read_state_frame<R: Read>(r: &mut R) -> io::Result<(f64, Vec<f32>)> {
    let timestamp = read_f64_le(r)?;
    let count = read_u64_le(r)?;
    let count = usize::try_from(count)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "state frame too large"))?;

    let mut values = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        values.push(read_f32_le(r)?);
    }
    Ok((timestamp, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_separators_and_quotes() {
        let mut out = [0.0f32; 4];
        parse_float_array(br#"frame ["3", 12.5,0.7   -1e-3]"#, &mut out).unwrap();
        assert_eq!(out, [3.0, 12.5, 0.7, -1e-3]);
    }

    #[test]
    fn extra_values_are_ignored() {
        let mut out = [0.0f32; 2];
        parse_float_array(b"[1, 2, 3, 4]", &mut out).unwrap();
        assert_eq!(out, [1.0, 2.0]);
    }

    #[test]
    fn short_or_garbled_arrays_are_errors() {
        let mut out = [0.0f32; 3];
        assert_eq!(
            parse_float_array(b"[1, 2]", &mut out),
            Err(WireError::Short { expected: 3, found: 2 })
        );
        assert_eq!(
            parse_float_array(b"[1, nope, 3]", &mut out),
            Err(WireError::BadToken { slot: 1, token: "nope".to_string() })
        );
        assert_eq!(parse_float_array(b"1, 2, 3", &mut out), Err(WireError::MissingArray));
    }

    #[test]
    fn final_part_carries_the_payload() {
        let parts: Vec<&[u8]> = vec![b"sim", b"[5, 6]"];
        let mut out = [0.0f32; 2];
        decode_frame_message(&parts, &mut out).unwrap();
        assert_eq!(out, [5.0, 6.0]);

        let none: Vec<&[u8]> = Vec::new();
        assert_eq!(decode_frame_message(&none, &mut out), Err(WireError::EmptyMessage));
    }

    #[test]
    fn timestamp_slot_keeps_double_precision() {
        let mut out = [0.0f32; 3];
        let t = parse_float_array(b"[1, 1700000010.25, 0]", &mut out).unwrap();
        assert_eq!(t, Some(1_700_000_010.25));
        // the f32 copy has lost the low bits
        assert_ne!(f64::from(out[1]), 1_700_000_010.25);

        let mut one = [0.0f32; 1];
        assert_eq!(parse_float_array(b"[7, 8]", &mut one), Ok(None));
    }

    #[test]
    fn state_frame_layout() {
        let bytes = encode_state_frame(1.5, &[2.0, -4.0]);
        assert_eq!(bytes.len(), state_frame_len(2));
        assert_eq!(&bytes[..8], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2u64.to_le_bytes());

        let (t, values) = read_state_frame(&mut bytes.as_slice()).unwrap();
        assert_eq!(t, 1.5);
        assert_eq!(values, vec![2.0, -4.0]);
    }
}

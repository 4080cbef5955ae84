//! Protobuf-compatible encoding of [`TelemetryMessage`].
//!
//! | Field | Tag | Type |
//! |---|---|---|
//! | `timestamp` | 1 | `double` |
//! | `img` | 2 | `bytes` |
//! | `pose` | 3 | `repeated float` |
//! | `force` | 4 | `repeated float` |
//! | `node` | 5 | `repeated float` |
//!
//! Float vectors are written packed.  The decoder also accepts the unpacked
//! form and skips fields it does not know.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use metaball_types::{MetaballError, TelemetryMessage};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

const FIELD_TIMESTAMP: u32 = 1;
const FIELD_IMG: u32 = 2;
const FIELD_POSE: u32 = 3;
const FIELD_FORCE: u32 = 4;
const FIELD_NODE: u32 = 5;

// ────────────────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────────────────

/// Encode `msg` into a fresh buffer.
pub fn encode(msg: &TelemetryMessage) -> Bytes {
    let capacity = 9
        + 10 + msg.image.len()
        + 3 * 10
        + 4 * (msg.pose.len() + msg.force.len() + msg.node.len());
    let mut buf = BytesMut::with_capacity(capacity);

    put_key(&mut buf, FIELD_TIMESTAMP, WIRE_FIXED64);
    buf.put_f64_le(msg.timestamp);

    if !msg.image.is_empty() {
        put_key(&mut buf, FIELD_IMG, WIRE_LEN);
        put_varint(&mut buf, msg.image.len() as u64);
        buf.put_slice(&msg.image);
    }

    put_packed_floats(&mut buf, FIELD_POSE, &msg.pose);
    put_packed_floats(&mut buf, FIELD_FORCE, &msg.force);
    put_packed_floats(&mut buf, FIELD_NODE, &msg.node);

    buf.freeze()
}

fn put_key(buf: &mut BytesMut, field: u32, wire_type: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire_type));
}

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn put_packed_floats(buf: &mut BytesMut, field: u32, values: &[f32]) {
    if values.is_empty() {
        return;
    }
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, (values.len() * 4) as u64);
    for v in values {
        buf.put_f32_le(*v);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Decoding
// ────────────────────────────────────────────────────────────────────────────

/// Decode one message blob.
///
/// # Errors
///
/// [`MetaballError::Decode`] on truncated input, an invalid wire type, or a
/// packed float field whose length is not a multiple of four.
pub fn decode(mut buf: &[u8]) -> Result<TelemetryMessage, MetaballError> {
    let mut msg = TelemetryMessage::default();

    while buf.has_remaining() {
        let key = get_varint(&mut buf)?;
        let field = (key >> 3) as u32;
        let wire_type = (key & 0x07) as u8;

        match (field, wire_type) {
            (FIELD_TIMESTAMP, WIRE_FIXED64) => {
                ensure_remaining(buf, 8, "timestamp")?;
                msg.timestamp = buf.get_f64_le();
            }
            (FIELD_IMG, WIRE_LEN) => {
                let chunk = get_length_delimited(&mut buf)?;
                msg.image = chunk.to_vec();
            }
            (FIELD_POSE, _) => get_floats(&mut buf, wire_type, &mut msg.pose)?,
            (FIELD_FORCE, _) => get_floats(&mut buf, wire_type, &mut msg.force)?,
            (FIELD_NODE, _) => get_floats(&mut buf, wire_type, &mut msg.node)?,
            (_, _) => skip_field(&mut buf, field, wire_type)?,
        }
    }

    Ok(msg)
}

fn ensure_remaining(buf: &[u8], n: usize, what: &str) -> Result<(), MetaballError> {
    if buf.remaining() < n {
        return Err(MetaballError::Decode(format!(
            "truncated {what}: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_varint(buf: &mut &[u8]) -> Result<u64, MetaballError> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return Err(MetaballError::Decode("truncated varint".to_string()));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(MetaballError::Decode("varint longer than 10 bytes".to_string()))
}

fn get_length_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], MetaballError> {
    let len = get_varint(buf)? as usize;
    ensure_remaining(buf, len, "length-delimited field")?;
    let whole: &'a [u8] = *buf;
    let (chunk, rest) = whole.split_at(len);
    *buf = rest;
    Ok(chunk)
}

fn get_floats(buf: &mut &[u8], wire_type: u8, out: &mut Vec<f32>) -> Result<(), MetaballError> {
    match wire_type {
        WIRE_LEN => {
            let mut chunk = get_length_delimited(buf)?;
            if chunk.len() % 4 != 0 {
                return Err(MetaballError::Decode(format!(
                    "packed float field of {} bytes",
                    chunk.len()
                )));
            }
            out.reserve(chunk.len() / 4);
            while chunk.has_remaining() {
                out.push(chunk.get_f32_le());
            }
            Ok(())
        }
        WIRE_FIXED32 => {
            ensure_remaining(buf, 4, "float")?;
            out.push(buf.get_f32_le());
            Ok(())
        }
        other => Err(MetaballError::Decode(format!(
            "float field with wire type {other}"
        ))),
    }
}

fn skip_field(buf: &mut &[u8], field: u32, wire_type: u8) -> Result<(), MetaballError> {
    match wire_type {
        WIRE_VARINT => {
            get_varint(buf)?;
        }
        WIRE_FIXED64 => {
            ensure_remaining(buf, 8, "fixed64")?;
            buf.advance(8);
        }
        WIRE_LEN => {
            get_length_delimited(buf)?;
        }
        WIRE_FIXED32 => {
            ensure_remaining(buf, 4, "fixed32")?;
            buf.advance(4);
        }
        other => {
            return Err(MetaballError::Decode(format!(
                "unsupported wire type {other} on field {field}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryMessage {
        TelemetryMessage {
            timestamp: 1_700_000_000.25,
            image: vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9],
            pose: vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3],
            force: vec![0.5, -0.5, 9.81, 0.0, 0.0, 0.01],
            node: vec![0.25; 18],
        }
    }

    #[test]
    fn encode_then_decode_preserves_message() {
        let msg = sample();
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn empty_vectors_are_omitted() {
        let msg = TelemetryMessage {
            timestamp: 1.0,
            ..Default::default()
        };
        let bytes = encode(&msg);
        // key + 8 byte double, nothing else.
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[0], 0x09);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn field_keys_match_schema() {
        let bytes = encode(&sample());
        assert_eq!(bytes[0], 0x09);
        assert_eq!(bytes[9], 0x12);
        // img length 6, so pose starts at 9 + 1 + 1 + 6.
        assert_eq!(bytes[17], 0x1A);
        assert_eq!(bytes[18], 24);
    }

    #[test]
    fn decoder_accepts_unpacked_floats() {
        let mut buf = BytesMut::new();
        put_key(&mut buf, FIELD_TIMESTAMP, WIRE_FIXED64);
        buf.put_f64_le(2.0);
        for v in [1.0f32, 2.0, 3.0] {
            put_key(&mut buf, FIELD_FORCE, WIRE_FIXED32);
            buf.put_f32_le(v);
        }
        let msg = decode(&buf).unwrap();
        assert_eq!(msg.force, vec![1.0, 2.0, 3.0]);
        assert_eq!(msg.timestamp, 2.0);
    }

    #[test]
    fn decoder_skips_unknown_fields() {
        let mut buf = BytesMut::new();
        put_key(&mut buf, 15, WIRE_VARINT);
        put_varint(&mut buf, 300);
        put_key(&mut buf, 16, WIRE_LEN);
        put_varint(&mut buf, 3);
        buf.put_slice(b"abc");
        buf.extend_from_slice(&encode(&sample()));
        assert_eq!(decode(&buf).unwrap(), sample());
    }

    #[test]
    fn truncated_frame_is_a_decode_error() {
        let bytes = encode(&sample());
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, MetaballError::Decode(_)));
    }

    #[test]
    fn packed_float_with_bad_length_is_rejected() {
        let mut buf = BytesMut::new();
        put_key(&mut buf, FIELD_POSE, WIRE_LEN);
        put_varint(&mut buf, 3);
        buf.put_slice(&[0, 0, 0]);
        assert!(matches!(decode(&buf), Err(MetaballError::Decode(_))));
    }

    #[test]
    fn multi_byte_varint_roundtrip() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 300);
        assert_eq!(&buf[..], &[0xAC, 0x02]);
        let mut slice: &[u8] = &buf;
        assert_eq!(get_varint(&mut slice).unwrap(), 300);
    }
}

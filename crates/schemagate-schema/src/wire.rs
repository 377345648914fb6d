//! Schema-id Framing
//!
//! Records leave the publisher as `[0x00][schema id, i32 BE][payload]`, the
//! layout Confluent-compatible brokers and consumers expect. The frame is how
//! a broker enforcing schemas finds the schema a record claims to follow.

use crate::error::{Result, SchemaError};
use crate::types::SchemaId;
use bytes::{BufMut, Bytes, BytesMut};

/// First byte of every framed record.
pub const MAGIC_BYTE: u8 = 0x00;

/// Magic byte plus the 4-byte schema id.
pub const HEADER_LEN: usize = 5;

/// Prefix `payload` with the frame header for `schema_id`.
pub fn encode_with_schema_id(schema_id: SchemaId, payload: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(HEADER_LEN + payload.len());
    framed.put_u8(MAGIC_BYTE);
    framed.put_i32(schema_id.0);
    framed.put_slice(payload);
    framed.freeze()
}

/// Split a framed record into its schema id and payload.
///
/// Fails with `DeserializationError` for records that were sent unframed.
pub fn decode_schema_id(framed: &[u8]) -> Result<(SchemaId, &[u8])> {
    match framed.split_first() {
        Some((&MAGIC_BYTE, rest)) if rest.len() >= HEADER_LEN - 1 => {
            let (id, payload) = rest.split_at(HEADER_LEN - 1);
            let mut be = [0u8; 4];
            be.copy_from_slice(id);
            Ok((SchemaId(i32::from_be_bytes(be)), payload))
        }
        Some((&MAGIC_BYTE, _)) => Err(SchemaError::DeserializationError(format!(
            "frame of {} bytes is shorter than the {}-byte header",
            framed.len(),
            HEADER_LEN
        ))),
        Some((other, _)) => Err(SchemaError::DeserializationError(format!(
            "record is not schema-framed (first byte 0x{:02x})",
            other
        ))),
        None => Err(SchemaError::DeserializationError(
            "empty record carries no schema id".to_string(),
        )),
    }
}

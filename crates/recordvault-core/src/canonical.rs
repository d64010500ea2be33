//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding for
//! transaction headers:
//! - Map keys are small integers written in ascending order
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The canonical encoding is what gets signed and hashed: the same
//! transaction must produce identical bytes on every platform, or signatures
//! and transaction ids stop agreeing.

use ciborium::value::Value;

use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::transaction::{Action, Transaction, TransactionHeader};
use crate::types::{RecordId, TxId};

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR, so numeric order is also
/// encoded-byte order.
mod keys {
    pub const VERSION: u64 = 0;
    pub const RECORD_ID: u64 = 1;
    pub const ACTOR: u64 = 2;
    pub const SEQ: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
    pub const ACTION: u64 = 5;
    pub const PREV_TX_ID: u64 = 6;
    pub const PAYLOAD_HASH: u64 = 7;

    pub const COUNT: u64 = 8;
}

/// Encode a transaction header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &TransactionHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(160);

    encode_uint(&mut buf, 5, keys::COUNT);

    encode_uint(&mut buf, 0, keys::VERSION);
    encode_uint(&mut buf, 0, header.version as u64);

    encode_uint(&mut buf, 0, keys::RECORD_ID);
    encode_bytes(&mut buf, header.record_id.as_bytes());

    encode_uint(&mut buf, 0, keys::ACTOR);
    encode_bytes(&mut buf, header.actor.as_bytes());

    encode_uint(&mut buf, 0, keys::SEQ);
    encode_uint(&mut buf, 0, header.seq);

    encode_uint(&mut buf, 0, keys::TIMESTAMP);
    encode_int(&mut buf, header.timestamp);

    encode_uint(&mut buf, 0, keys::ACTION);
    encode_uint(&mut buf, 0, header.action.to_u16() as u64);

    encode_uint(&mut buf, 0, keys::PREV_TX_ID);
    match &header.prev_tx_id {
        Some(id) => encode_bytes(&mut buf, id.as_bytes()),
        None => buf.push(0xf6),
    }

    encode_uint(&mut buf, 0, keys::PAYLOAD_HASH);
    encode_bytes(&mut buf, header.payload_hash.as_bytes());

    buf
}

/// Encode an entire transaction to canonical bytes.
///
/// Format: canonical_header || payload || signature
pub fn canonical_bytes(tx: &Transaction) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&tx.header);
    buf.extend_from_slice(&tx.payload);
    buf.extend_from_slice(&tx.signature.0);
    buf
}

/// Construct the signed message (header || payload).
pub fn signed_message(tx: &Transaction) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&tx.header);
    buf.extend_from_slice(&tx.payload);
    buf
}

/// Encode a signed integer (major types 0 and 1).
fn encode_int(buf: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Decode a transaction from canonical bytes.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, CoreError> {
    // Minimum size: header (variable) + 64 byte signature
    if bytes.len() < 64 {
        return Err(CoreError::MalformedTransaction("too short".into()));
    }

    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let header = cbor_value_to_header(&value)?;

    // Header length by re-encoding; canonical bytes must round-trip exactly
    let header_bytes = canonical_header_bytes(&header);
    let header_len = header_bytes.len();
    if bytes.len() < header_len || bytes[..header_len] != header_bytes[..] {
        return Err(CoreError::MalformedTransaction(
            "header is not canonically encoded".into(),
        ));
    }

    let remaining = &bytes[header_len..];
    if remaining.len() < 64 {
        return Err(CoreError::MalformedTransaction(
            "insufficient bytes for signature".into(),
        ));
    }

    // Payload is everything except the last 64 bytes
    let payload_len = remaining.len() - 64;
    let payload = remaining[..payload_len].to_vec();
    let sig_bytes: [u8; 64] = remaining[payload_len..]
        .try_into()
        .map_err(|_| CoreError::MalformedTransaction("invalid signature length".into()))?;

    Ok(Transaction {
        header,
        payload: payload.into(),
        signature: Ed25519Signature(sig_bytes),
    })
}

fn field_bytes32(value: Option<&Value>, name: &str) -> Result<[u8; 32], CoreError> {
    match value {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Ok(arr)
        }
        _ => Err(CoreError::MalformedTransaction(format!("invalid {}", name))),
    }
}

fn field_int(value: Option<&Value>, name: &str) -> Result<i128, CoreError> {
    match value {
        Some(Value::Integer(i)) => Ok(i128::from(*i)),
        _ => Err(CoreError::MalformedTransaction(format!("missing {}", name))),
    }
}

/// Convert a CBOR Value (map) back to a TransactionHeader.
fn cbor_value_to_header(value: &Value) -> Result<TransactionHeader, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedTransaction("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let version = u8::try_from(field_int(get(keys::VERSION), "version")?)
        .map_err(|_| CoreError::MalformedTransaction("version out of range".into()))?;
    let record_id = RecordId(field_bytes32(get(keys::RECORD_ID), "record_id")?);
    let actor = Ed25519PublicKey(field_bytes32(get(keys::ACTOR), "actor")?);
    let seq = u64::try_from(field_int(get(keys::SEQ), "seq")?)
        .map_err(|_| CoreError::MalformedTransaction("seq out of range".into()))?;
    let timestamp = i64::try_from(field_int(get(keys::TIMESTAMP), "timestamp")?)
        .map_err(|_| CoreError::MalformedTransaction("timestamp out of range".into()))?;

    let action_raw = field_int(get(keys::ACTION), "action")?;
    let action = u16::try_from(action_raw)
        .ok()
        .and_then(Action::from_u16)
        .ok_or_else(|| CoreError::MalformedTransaction(format!("invalid action: {}", action_raw)))?;

    let prev_tx_id = match get(keys::PREV_TX_ID) {
        Some(Value::Null) | None => None,
        other => Some(TxId(field_bytes32(other, "prev_tx_id")?)),
    };

    let payload_hash = Blake3Hash(field_bytes32(get(keys::PAYLOAD_HASH), "payload_hash")?);

    Ok(TransactionHeader {
        version,
        record_id,
        actor,
        seq,
        timestamp,
        action,
        prev_tx_id,
        payload_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::transaction::TransactionBuilder;

    fn sample_tx(seq: u64) -> Transaction {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let mut builder = TransactionBuilder::new(RecordId::from_bytes([0x01; 32]), seq)
            .timestamp(1736870400000)
            .payload(b"hello world".to_vec());
        builder = if seq == 1 {
            builder.action(Action::RegisterRecord)
        } else {
            builder
                .action(Action::RequestAccess)
                .prev(TxId::from_bytes([0xaa; 32]))
        };
        builder.sign(&keypair)
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let tx = sample_tx(1);
        assert_eq!(canonical_bytes(&tx), canonical_bytes(&tx));
    }

    #[test]
    fn test_header_starts_with_map_of_eight() {
        let tx = sample_tx(1);
        let header = canonical_header_bytes(&tx.header);
        assert_eq!(header[0], 0xa8);
        // key 0, version 0
        assert_eq!(&header[1..3], &[0x00, 0x00]);
        // key 1, 32-byte string
        assert_eq!(&header[3..5], &[0x01, 0x58]);
        assert_eq!(header[5], 32);
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        // 0-23: single byte
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        // 24-255: two bytes
        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        // 256-65535: three bytes
        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        // negative
        buf.clear();
        encode_int(&mut buf, -1);
        assert_eq!(buf, vec![0x20]);
    }

    #[test]
    fn test_decode_matches_original() {
        for seq in [1, 2] {
            let tx = sample_tx(seq);
            let decoded = decode_transaction(&canonical_bytes(&tx)).unwrap();
            assert_eq!(tx, decoded);
            assert_eq!(tx.compute_id(), decoded.compute_id());
        }
    }

    #[test]
    fn test_decode_empty_payload() {
        let keypair = Keypair::from_seed(&[0x07; 32]);
        let tx = TransactionBuilder::new(RecordId::from_bytes([0x02; 32]), 1)
            .action(Action::RegisterRecord)
            .sign(&keypair);

        let decoded = decode_transaction(&canonical_bytes(&tx)).unwrap();
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.signature, tx.signature);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let bytes = canonical_bytes(&sample_tx(1));
        assert!(decode_transaction(&bytes[..40]).is_err());
    }

    #[test]
    fn test_tx_id_from_canonical_bytes() {
        let tx = sample_tx(1);
        let manual = TxId(Blake3Hash::hash(&canonical_bytes(&tx)).0);
        assert_eq!(tx.compute_id(), manual);
    }
}

//! Golden test vectors.
//!
//! Content-address vectors are published digests and must match exactly.
//! Transaction vectors pin down canonical encoding: regenerating one must
//! always give the same bytes and id, and [`transaction_vectors_json`]
//! exports them for comparison with other implementations.

use recordvault_core::{
    canonical_bytes, Action, ContentAddress, HashAlgorithm, Keypair, RecordId, Transaction,
    TransactionBuilder, TxId,
};
use serde::Serialize;

/// A content-address known answer.
#[derive(Debug, Clone)]
pub struct AddressVector {
    pub name: &'static str,
    pub algorithm: HashAlgorithm,
    pub input: &'static [u8],
    /// Expected `algorithm:hex` rendering.
    pub expected: &'static str,
}

pub fn address_vectors() -> Vec<AddressVector> {
    vec![
        AddressVector {
            name: "blake3 of empty input",
            algorithm: HashAlgorithm::Blake3,
            input: b"",
            expected: "blake3:af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262",
        },
        AddressVector {
            name: "sha256 of empty input",
            algorithm: HashAlgorithm::Sha256,
            input: b"",
            expected: "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
        AddressVector {
            name: "sha256 of abc",
            algorithm: HashAlgorithm::Sha256,
            input: b"abc",
            expected: "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        },
        AddressVector {
            name: "sha256 of lab-result",
            algorithm: HashAlgorithm::Sha256,
            input: b"lab-result",
            expected: "sha256:795001a89a6aa893c1c00ae55d1e3948879c8ec6032abecfba39d7f7b8172bfc",
        },
    ]
}

/// A transaction built from fixed inputs.
#[derive(Debug, Clone)]
pub struct TransactionVector {
    pub name: &'static str,
    pub seed: [u8; 32],
    pub record_id: [u8; 32],
    pub seq: u64,
    pub action: Action,
    pub payload: &'static [u8],
    pub timestamp: i64,
}

pub fn transaction_vectors() -> Vec<TransactionVector> {
    vec![
        TransactionVector {
            name: "register with empty payload",
            seed: [0x42; 32],
            record_id: [0x10; 32],
            seq: 1,
            action: Action::RegisterRecord,
            payload: b"",
            timestamp: 1_736_870_400_000,
        },
        TransactionVector {
            name: "request access",
            seed: [0x43; 32],
            record_id: [0x10; 32],
            seq: 2,
            action: Action::RequestAccess,
            payload: b"follow-up",
            timestamp: 1_736_870_401_000,
        },
        TransactionVector {
            name: "revoke",
            seed: [0x42; 32],
            record_id: [0x10; 32],
            seq: 3,
            action: Action::Revoke,
            payload: b"",
            timestamp: 1_736_870_402_000,
        },
    ]
}

/// Build a vector's transaction. Entries after the first point at a fixed
/// dummy predecessor.
pub fn generate_transaction_from_vector(vector: &TransactionVector) -> Transaction {
    let keypair = Keypair::from_seed(&vector.seed);
    let mut builder = TransactionBuilder::new(RecordId::from_bytes(vector.record_id), vector.seq)
        .action(vector.action)
        .timestamp(vector.timestamp)
        .payload(vector.payload.to_vec());
    if vector.seq > 1 {
        builder = builder.prev(TxId::from_bytes([0xaa; 32]));
    }
    builder.sign(&keypair)
}

/// Check every address vector, returning `(name, matches, actual)`.
pub fn verify_address_vectors() -> Vec<(String, bool, String)> {
    address_vectors()
        .iter()
        .map(|v| {
            let actual = ContentAddress::compute(v.algorithm, v.input).to_string();
            (v.name.to_string(), actual == v.expected, actual)
        })
        .collect()
}

#[derive(Serialize)]
struct ExportedVector {
    name: &'static str,
    actor: String,
    canonical_bytes: String,
    tx_id: String,
}

/// Export the transaction vectors with their canonical bytes and ids.
pub fn transaction_vectors_json() -> serde_json::Result<String> {
    let exported: Vec<ExportedVector> = transaction_vectors()
        .iter()
        .map(|v| {
            let tx = generate_transaction_from_vector(v);
            ExportedVector {
                name: v.name,
                actor: tx.actor().to_hex(),
                canonical_bytes: hex::encode(canonical_bytes(&tx)),
                tx_id: tx.compute_id().to_hex(),
            }
        })
        .collect();
    serde_json::to_string_pretty(&exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_vectors_match() {
        for (name, matches, actual) in verify_address_vectors() {
            assert!(matches, "vector '{}' produced {}", name, actual);
        }
    }

    #[test]
    fn test_transaction_vectors_are_deterministic() {
        for vector in transaction_vectors() {
            let a = generate_transaction_from_vector(&vector);
            let b = generate_transaction_from_vector(&vector);
            assert_eq!(
                canonical_bytes(&a),
                canonical_bytes(&b),
                "vector '{}' produced different canonical bytes",
                vector.name
            );
            assert_eq!(a.compute_id(), b.compute_id());
        }
    }

    #[test]
    fn test_export_lists_every_vector() {
        let json = transaction_vectors_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.as_array().map(Vec::len),
            Some(transaction_vectors().len())
        );
    }
}

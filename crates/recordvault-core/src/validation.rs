//! Transaction validation: signature verification and structural checks.

use crate::canonical::signed_message;
use crate::crypto::Blake3Hash;
use crate::error::ValidationError;
use crate::transaction::{Action, Transaction, TX_VERSION};

/// Validate a transaction's structure and signature (without log context).
///
/// This performs:
/// - Version check
/// - Payload hash verification
/// - Position rules (RegisterRecord is always seq=1 with no prev)
/// - Signature verification against the claimed actor
pub fn validate_transaction(tx: &Transaction) -> Result<(), ValidationError> {
    validate_transaction_structure(tx)?;

    let message = signed_message(tx);
    tx.header
        .actor
        .verify(&message, &tx.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;

    Ok(())
}

/// Validate transaction structure without signature verification.
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), ValidationError> {
    // 1. Check version
    if tx.header.version != TX_VERSION {
        return Err(ValidationError::UnsupportedVersion(tx.header.version));
    }

    // 2. Verify payload hash
    if Blake3Hash::hash(&tx.payload) != tx.header.payload_hash {
        return Err(ValidationError::PayloadHashMismatch);
    }

    // 3. seq starts at 1
    if tx.header.seq == 0 {
        return Err(ValidationError::InvalidSequence {
            expected: 1,
            got: 0,
        });
    }

    // 4. RegisterRecord opens the log and nothing else may
    let is_register = tx.header.action == Action::RegisterRecord;
    if is_register != (tx.header.seq == 1) {
        return Err(ValidationError::StructuralError(format!(
            "{} transaction at seq {}",
            tx.header.action.name(),
            tx.header.seq
        )));
    }

    // 5. prev is present exactly when seq > 1
    if tx.header.seq == 1 && tx.header.prev_tx_id.is_some() {
        return Err(ValidationError::InvalidPrevTransaction {
            expected: None,
            got: tx.header.prev_tx_id,
        });
    }
    if tx.header.seq > 1 && tx.header.prev_tx_id.is_none() {
        return Err(ValidationError::StructuralError(
            "seq > 1 requires prev_tx_id".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519Signature, Keypair};
    use crate::transaction::TransactionBuilder;
    use crate::types::{RecordId, TxId};

    fn keypair() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn record() -> RecordId {
        RecordId::from_bytes([0x10; 32])
    }

    #[test]
    fn test_valid_register() {
        let tx = TransactionBuilder::new(record(), 1)
            .timestamp(1736870400000)
            .action(Action::RegisterRecord)
            .payload(b"meta".to_vec())
            .sign(&keypair());

        assert!(validate_transaction(&tx).is_ok());
    }

    #[test]
    fn test_valid_request() {
        let tx = TransactionBuilder::new(record(), 2)
            .action(Action::RequestAccess)
            .prev(TxId::from_bytes([0x11; 32]))
            .payload(b"reason".to_vec())
            .sign(&keypair());

        assert!(validate_transaction(&tx).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let mut tx = TransactionBuilder::new(record(), 1)
            .action(Action::RegisterRecord)
            .sign(&keypair());
        tx.signature = Ed25519Signature::ZERO;

        assert!(matches!(
            validate_transaction(&tx),
            Err(ValidationError::SignatureFailed)
        ));
    }

    #[test]
    fn test_forged_actor_fails_signature() {
        let mut tx = TransactionBuilder::new(record(), 1)
            .action(Action::RegisterRecord)
            .sign(&keypair());
        tx.header.actor = Keypair::from_seed(&[0x43; 32]).public_key();

        assert!(matches!(
            validate_transaction(&tx),
            Err(ValidationError::SignatureFailed)
        ));
    }

    #[test]
    fn test_payload_hash_mismatch() {
        let mut tx = TransactionBuilder::new(record(), 1)
            .action(Action::RegisterRecord)
            .payload(b"original".to_vec())
            .sign(&keypair());
        tx.payload = b"tampered".to_vec().into();

        assert!(matches!(
            validate_transaction(&tx),
            Err(ValidationError::PayloadHashMismatch)
        ));
    }

    #[test]
    fn test_register_must_be_first() {
        let tx = TransactionBuilder::new(record(), 2)
            .action(Action::RegisterRecord)
            .prev(TxId::from_bytes([0x11; 32]))
            .sign(&keypair());

        assert!(matches!(
            validate_transaction_structure(&tx),
            Err(ValidationError::StructuralError(_))
        ));
    }

    #[test]
    fn test_first_must_be_register() {
        let tx = TransactionBuilder::new(record(), 1)
            .action(Action::Approve)
            .sign(&keypair());

        assert!(validate_transaction_structure(&tx).is_err());
    }

    #[test]
    fn test_seq_gt_one_requires_prev() {
        let tx = TransactionBuilder::new(record(), 3)
            .action(Action::Deny)
            .sign(&keypair());

        assert!(matches!(
            validate_transaction_structure(&tx),
            Err(ValidationError::StructuralError(_))
        ));
    }
}

//! Per-recipient key wrapping.
//!
//! A data key is wrapped for a grantee with an ephemeral X25519 exchange
//! against the grantee's public key. The wrap key is derived with BLAKE3
//! over the shared secret and a context of (data key id, recipient key,
//! ephemeral key), then the data key is sealed with ChaCha20-Poly1305.
//! Only the holder of the recipient's static secret can open it.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use recordvault_core::DataKeyId;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::{
    EncryptionNonce, EphemeralKeyPair, KeyMaterial, X25519PublicKey, X25519StaticSecret,
};
use crate::error::{KeyError, Result};
use crate::provider::CryptoProvider;

/// A data key sealed for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// The wrapped data key.
    pub data_key_id: DataKeyId,

    /// Version of the wrapped data key.
    pub key_version: u32,

    /// Recipient the key was wrapped for.
    pub recipient: X25519PublicKey,

    /// Sender's side of the key agreement.
    pub ephemeral_public: X25519PublicKey,

    /// Nonce for the wrap cipher.
    pub nonce: EncryptionNonce,

    /// Sealed key material (32 bytes plus a 16-byte tag).
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Wrap `material` for `recipient`.
    pub(crate) fn seal(
        provider: &dyn CryptoProvider,
        data_key_id: DataKeyId,
        key_version: u32,
        material: &KeyMaterial,
        recipient: &X25519PublicKey,
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate(provider);
        let ephemeral_public = ephemeral.public_key();

        let shared = ephemeral
            .diffie_hellman(recipient)
            .ok_or_else(|| KeyError::KeyWrapFailure {
                data_key_id,
                reason: "recipient public key is a low-order point".into(),
            })?;

        let context = wrap_context(&data_key_id, recipient, &ephemeral_public);
        let wrap_key = shared.derive_wrap_key(&context);

        let nonce = EncryptionNonce::generate(provider);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(wrap_key.as_bytes()));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: material.as_bytes(),
                    aad: &context,
                },
            )
            .map_err(|_| KeyError::KeyWrapFailure {
                data_key_id,
                reason: "wrap cipher failed".into(),
            })?;

        Ok(Self {
            data_key_id,
            key_version,
            recipient: *recipient,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open with the recipient's static secret.
    ///
    /// Fails with `WrongRecipient` if the key was wrapped for a different
    /// key pair or any field was altered.
    pub(crate) fn open(&self, secret: &X25519StaticSecret) -> Result<KeyMaterial> {
        let wrong_recipient = || KeyError::WrongRecipient {
            data_key_id: self.data_key_id,
        };

        if secret.public_key() != self.recipient {
            return Err(wrong_recipient());
        }

        let shared = secret
            .diffie_hellman(&self.ephemeral_public)
            .ok_or_else(wrong_recipient)?;
        let context = wrap_context(&self.data_key_id, &self.recipient, &self.ephemeral_public);
        let wrap_key = shared.derive_wrap_key(&context);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(wrap_key.as_bytes()));
        let mut plain = cipher
            .decrypt(
                Nonce::from_slice(self.nonce.as_bytes()),
                Payload {
                    msg: &self.ciphertext,
                    aad: &context,
                },
            )
            .map_err(|_| wrong_recipient())?;

        if plain.len() != 32 {
            plain.zeroize();
            return Err(wrong_recipient());
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&plain);
        plain.zeroize();

        let material = KeyMaterial::from_bytes(bytes);
        bytes.zeroize();
        Ok(material)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| KeyError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| KeyError::Serialization(e.to_string()))
    }
}

fn wrap_context(
    data_key_id: &DataKeyId,
    recipient: &X25519PublicKey,
    ephemeral_public: &X25519PublicKey,
) -> [u8; 96] {
    let mut context = [0u8; 96];
    context[..32].copy_from_slice(data_key_id.as_bytes());
    context[32..64].copy_from_slice(recipient.as_bytes());
    context[64..].copy_from_slice(ephemeral_public.as_bytes());
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SeededCryptoProvider;

    fn setup() -> (SeededCryptoProvider, KeyMaterial, X25519StaticSecret) {
        (
            SeededCryptoProvider::new([0x44; 32]),
            KeyMaterial::from_bytes([0x99; 32]),
            X25519StaticSecret::from_bytes([0x17; 32]),
        )
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (provider, material, secret) = setup();
        let id = DataKeyId::from_bytes([0x01; 32]);

        let wrapped = WrappedKey::seal(&provider, id, 1, &material, &secret.public_key()).unwrap();
        let opened = wrapped.open(&secret).unwrap();

        assert_eq!(opened.as_bytes(), material.as_bytes());
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let (provider, material, secret) = setup();
        let other = X25519StaticSecret::from_bytes([0x18; 32]);
        let id = DataKeyId::from_bytes([0x01; 32]);

        let wrapped = WrappedKey::seal(&provider, id, 1, &material, &secret.public_key()).unwrap();

        assert!(matches!(
            wrapped.open(&other),
            Err(KeyError::WrongRecipient { .. })
        ));
    }

    #[test]
    fn test_relabelled_recipient_fails() {
        let (provider, material, secret) = setup();
        let other = X25519StaticSecret::from_bytes([0x18; 32]);
        let id = DataKeyId::from_bytes([0x01; 32]);

        let mut wrapped =
            WrappedKey::seal(&provider, id, 1, &material, &secret.public_key()).unwrap();
        wrapped.recipient = other.public_key();

        assert!(matches!(
            wrapped.open(&other),
            Err(KeyError::WrongRecipient { .. })
        ));
    }

    #[test]
    fn test_tampered_key_id_fails() {
        let (provider, material, secret) = setup();
        let id = DataKeyId::from_bytes([0x01; 32]);

        let mut wrapped =
            WrappedKey::seal(&provider, id, 1, &material, &secret.public_key()).unwrap();
        wrapped.data_key_id = DataKeyId::from_bytes([0x02; 32]);

        assert!(wrapped.open(&secret).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (provider, material, secret) = setup();
        let id = DataKeyId::from_bytes([0x01; 32]);

        let mut wrapped =
            WrappedKey::seal(&provider, id, 1, &material, &secret.public_key()).unwrap();
        wrapped.ciphertext[0] ^= 0x80;

        assert!(wrapped.open(&secret).is_err());
    }

    #[test]
    fn test_low_order_recipient_fails() {
        let (provider, material, _) = setup();
        let id = DataKeyId::from_bytes([0x01; 32]);

        let result = WrappedKey::seal(
            &provider,
            id,
            1,
            &material,
            &X25519PublicKey::from_bytes([0u8; 32]),
        );
        assert!(matches!(result, Err(KeyError::KeyWrapFailure { .. })));
    }

    #[test]
    fn test_wrapped_key_cbor() {
        let (provider, material, secret) = setup();
        let id = DataKeyId::from_bytes([0x01; 32]);

        let wrapped = WrappedKey::seal(&provider, id, 3, &material, &secret.public_key()).unwrap();
        let recovered = WrappedKey::from_bytes(&wrapped.to_bytes().unwrap()).unwrap();
        assert_eq!(wrapped, recovered);
    }
}

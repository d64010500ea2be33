//! Envelope encryption of record payloads.
//!
//! A record's bytes are sealed under its data key with ChaCha20-Poly1305.
//! The data key id is bound as associated data, so a sealed payload
//! presented under any other key id fails authentication. The
//! [`SealedPayload`] is what the content store holds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use recordvault_core::DataKeyId;
use serde::{Deserialize, Serialize};

use crate::crypto::{AuthTag, EncryptionNonce, KeyMaterial};
use crate::error::{KeyError, Result};
use crate::provider::CryptoProvider;

/// AEAD cipher used for payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadCipher {
    /// ChaCha20-Poly1305 with a 256-bit key, 96-bit nonce and 128-bit tag.
    #[default]
    #[serde(rename = "chacha20poly1305")]
    ChaCha20Poly1305,
}

impl AeadCipher {
    /// Configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            AeadCipher::ChaCha20Poly1305 => "chacha20poly1305",
        }
    }
}

/// An encrypted record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// Cipher used.
    pub format: AeadCipher,

    /// Key the payload was sealed under; also the associated data.
    pub data_key_id: DataKeyId,

    /// Nonce, unique per data key.
    pub nonce: EncryptionNonce,

    /// Ciphertext without the tag.
    pub ciphertext: Vec<u8>,

    /// Detached authentication tag.
    pub tag: AuthTag,
}

impl SealedPayload {
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

    /// Ciphertext length, equal to the plaintext length.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

/// Seals and opens payloads, refusing to reuse a nonce under one key.
#[derive(Clone)]
pub struct EnvelopeCodec {
    provider: Arc<dyn CryptoProvider>,
    used_nonces: Arc<Mutex<HashMap<DataKeyId, HashSet<[u8; 12]>>>>,
}

impl EnvelopeCodec {
    /// Create a codec drawing nonces from `provider`.
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            provider,
            used_nonces: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seal `plaintext` under a key with a fresh nonce.
    pub fn encrypt(
        &self,
        data_key_id: DataKeyId,
        key: &KeyMaterial,
        plaintext: &[u8],
    ) -> Result<SealedPayload> {
        let nonce = EncryptionNonce::generate(self.provider.as_ref());
        self.encrypt_with_nonce(data_key_id, key, nonce, plaintext)
    }

    /// Seal with a caller-chosen nonce. Fails with `NonceReuse` before any
    /// ciphertext is produced if the nonce was already used for this key.
    pub fn encrypt_with_nonce(
        &self,
        data_key_id: DataKeyId,
        key: &KeyMaterial,
        nonce: EncryptionNonce,
        plaintext: &[u8],
    ) -> Result<SealedPayload> {
        self.reserve_nonce(data_key_id, nonce)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(
                Nonce::from_slice(nonce.as_bytes()),
                data_key_id.as_bytes(),
                &mut buffer,
            )
            .map_err(|_| KeyError::Serialization("plaintext too large to seal".into()))?;

        let mut tag_bytes = [0u8; 16];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok(SealedPayload {
            format: AeadCipher::ChaCha20Poly1305,
            data_key_id,
            nonce,
            ciphertext: buffer,
            tag: AuthTag::from_bytes(tag_bytes),
        })
    }

    /// Open a sealed payload. Any altered bit fails closed.
    pub fn decrypt(&self, sealed: &SealedPayload, key: &KeyMaterial) -> Result<Vec<u8>> {
        match sealed.format {
            AeadCipher::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
                let mut buffer = sealed.ciphertext.clone();
                cipher
                    .decrypt_in_place_detached(
                        Nonce::from_slice(sealed.nonce.as_bytes()),
                        sealed.data_key_id.as_bytes(),
                        &mut buffer,
                        Tag::from_slice(sealed.tag.as_bytes()),
                    )
                    .map_err(|_| KeyError::IntegrityFailure {
                        data_key_id: sealed.data_key_id,
                    })?;
                Ok(buffer)
            }
        }
    }

    /// Forget the nonces recorded for a retired key.
    pub fn forget_key(&self, data_key_id: &DataKeyId) -> Result<()> {
        let mut used = self.used_nonces.lock().map_err(|_| KeyError::Poisoned)?;
        used.remove(data_key_id);
        Ok(())
    }

    fn reserve_nonce(&self, data_key_id: DataKeyId, nonce: EncryptionNonce) -> Result<()> {
        let mut used = self.used_nonces.lock().map_err(|_| KeyError::Poisoned)?;
        if !used.entry(data_key_id).or_default().insert(nonce.0) {
            return Err(KeyError::NonceReuse { data_key_id });
        }
        Ok(())
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec").finish_non_exhaustive()
    }
}

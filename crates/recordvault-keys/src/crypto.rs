//! Cryptographic building blocks for the key manager.
//!
//! Provides X25519 key agreement, the BLAKE3 key-derivation step used for
//! wrapping, and zeroizing containers for symmetric key material.

use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::provider::{random_array, CryptoProvider};

/// Context string for wrap-key derivation. Changing it breaks every wrapped key.
const WRAP_KDF_CONTEXT: &str = "recordvault-keys-v0 wrap-key";

/// Context string for key fingerprints.
const FINGERPRINT_CONTEXT: &str = "recordvault-keys-v0 fingerprint";

/// An X25519 public key (32 bytes), used to wrap data keys for a recipient.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: String = self.0[..8].iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "X25519Pub({})", hex)
    }
}

/// An X25519 static secret key. Lives in the recipient's wallet.
///
/// Unlike Ed25519, X25519 keys are only for key agreement, not signing.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        let secret = Self(StaticSecret::from(bytes));
        bytes.zeroize();
        secret
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Returns `None` if the peer key is a low-order point.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> Option<SharedKey> {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        if !shared.was_contributory() {
            return None;
        }
        Some(SharedKey(*shared.as_bytes()))
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519StaticSecret({:?})", self.public_key())
    }
}

/// One-time key pair for wrapping a single data key.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate from the injected provider.
    pub fn generate(provider: &dyn CryptoProvider) -> Self {
        let mut bytes: [u8; 32] = random_array(provider);
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once). Returns `None`
    /// if the peer key is a low-order point.
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> Option<SharedKey> {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        if !shared.was_contributory() {
            return None;
        }
        Some(SharedKey(*shared.as_bytes()))
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Derive the key that wraps a data key.
    ///
    /// `context` binds the wrap to a specific data key and recipient.
    pub fn derive_wrap_key(&self, context: &[u8]) -> KeyMaterial {
        let mut hasher = blake3::Hasher::new_derive_key(WRAP_KDF_CONTEXT);
        hasher.update(&self.0);
        hasher.update(context);
        KeyMaterial(*hasher.finalize().as_bytes())
    }
}

/// 256 bits of symmetric key material. Zeroized on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; 32]);

impl KeyMaterial {
    /// Draw fresh material from the provider.
    pub fn generate(provider: &dyn CryptoProvider) -> Self {
        Self(random_array(provider))
    }

    pub(crate) fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// A one-way fingerprint, safe to log or compare.
    pub fn fingerprint(&self) -> [u8; 32] {
        blake3::derive_key(FINGERPRINT_CONTEXT, &self.0)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Draw a nonce from the provider.
    pub fn generate(provider: &dyn CryptoProvider) -> Self {
        Self(random_array(provider))
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// A 128-bit Poly1305 authentication tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTag(pub [u8; 16]);

impl AuthTag {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

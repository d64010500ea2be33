//! Principals: signing wallets and the encryption-key directory.
//!
//! A principal is identified by its Ed25519 public key. Wrapping a data key
//! for a principal needs its X25519 public key, which is looked up through a
//! [`Directory`] at the moment of approval.

use std::collections::HashMap;
use std::sync::RwLock;

use recordvault_core::{Ed25519PublicKey, Ed25519Signature, Keypair, PrincipalId, Signer};
use recordvault_keys::{X25519PublicKey, X25519StaticSecret};

/// Resolves a principal to its current encryption key.
///
/// # Implementers
///
/// - [`MemoryDirectory`]: an in-process table for tests and local tools
pub trait Directory: Send + Sync {
    /// The principal's current X25519 public key, `None` if unknown.
    fn encryption_key(&self, principal: &PrincipalId) -> Option<X25519PublicKey>;
}

/// In-memory principal directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    keys: RwLock<HashMap<PrincipalId, X25519PublicKey>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish or replace a principal's encryption key.
    pub fn register(&self, principal: PrincipalId, key: X25519PublicKey) {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.insert(principal, key);
    }

    /// Publish a wallet's encryption key under its principal id.
    pub fn register_wallet(&self, wallet: &LocalWallet) {
        self.register(wallet.principal_id(), wallet.encryption_public_key());
    }

    pub fn remove(&self, principal: &PrincipalId) -> Option<X25519PublicKey> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.remove(principal)
    }
}

impl Directory for MemoryDirectory {
    fn encryption_key(&self, principal: &PrincipalId) -> Option<X25519PublicKey> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        keys.get(principal).copied()
    }
}

/// A local wallet: an Ed25519 signing key and an X25519 encryption secret.
///
/// The vault never keeps a wallet; callers pass it as a [`Signer`] and hand
/// its secret to the read path when opening a wrapped key.
pub struct LocalWallet {
    signing: Keypair,
    encryption: X25519StaticSecret,
}

impl LocalWallet {
    /// Generate a wallet from OS randomness.
    pub fn generate() -> Self {
        Self {
            signing: Keypair::generate(),
            encryption: X25519StaticSecret::generate(),
        }
    }

    /// Deterministic wallet for tests.
    pub fn from_seeds(signing_seed: [u8; 32], encryption_seed: [u8; 32]) -> Self {
        Self {
            signing: Keypair::from_seed(&signing_seed),
            encryption: X25519StaticSecret::from_bytes(encryption_seed),
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.signing.public_key()
    }

    pub fn encryption_public_key(&self) -> X25519PublicKey {
        self.encryption.public_key()
    }

    pub fn encryption_secret(&self) -> &X25519StaticSecret {
        &self.encryption
    }
}

impl Signer for LocalWallet {
    fn public_key(&self) -> Ed25519PublicKey {
        self.signing.public_key()
    }

    fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing.sign(message)
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalWallet({:?})", self.principal_id())
    }
}

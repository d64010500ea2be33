//! Injected randomness.
//!
//! Key material, record ids, nonces and ephemeral wrapping secrets all come
//! from a [`CryptoProvider`] passed in at construction time. Production code
//! uses [`OsCryptoProvider`]; tests use [`SeededCryptoProvider`] to get
//! reproducible keys and ids.

use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// A source of cryptographically secure random bytes.
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Draw a fixed-size array from a provider.
pub fn random_array<const N: usize>(provider: &dyn CryptoProvider) -> [u8; N] {
    let mut out = [0u8; N];
    provider.fill_bytes(&mut out);
    out
}

/// Operating-system randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCryptoProvider;

impl CryptoProvider for OsCryptoProvider {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Deterministic CSPRNG seeded by the caller. For tests and test vectors.
pub struct SeededCryptoProvider {
    rng: Mutex<StdRng>,
}

impl SeededCryptoProvider {
    /// Create from a 32-byte seed.
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_seed(seed)),
        }
    }
}

impl CryptoProvider for SeededCryptoProvider {
    fn fill_bytes(&self, dest: &mut [u8]) {
        // A panic mid-fill leaves the rng usable
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.fill_bytes(dest);
    }
}

impl std::fmt::Debug for SeededCryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SeededCryptoProvider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_provider_is_reproducible() {
        let a = SeededCryptoProvider::new([0x01; 32]);
        let b = SeededCryptoProvider::new([0x01; 32]);
        assert_eq!(random_array::<32>(&a), random_array::<32>(&b));
    }

    #[test]
    fn test_seeded_provider_advances() {
        let p = SeededCryptoProvider::new([0x01; 32]);
        assert_ne!(random_array::<16>(&p), random_array::<16>(&p));
    }

    #[test]
    fn test_os_provider_fills() {
        let p = OsCryptoProvider;
        // 2^-256 chance of a false failure
        assert_ne!(random_array::<32>(&p), [0u8; 32]);
    }
}

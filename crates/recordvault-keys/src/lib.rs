//! # RecordVault Keys
//!
//! Data keys, envelope encryption and per-recipient key wrapping.
//!
//! ## Key model
//!
//! Every record is sealed under its own data key:
//!
//! 1. **Data key**: a 256-bit ChaCha20-Poly1305 key held by the [`KeyManager`]
//! 2. **Wrapped key**: the data key sealed for one grantee via X25519 + BLAKE3
//!
//! Granting access wraps the data key for the grantee. Revoking access cannot
//! take back a key already handed out, so the record is re-keyed: the manager
//! rotates to a successor key, the payload is sealed again and the remaining
//! grantees receive freshly wrapped keys.
//!
//! All randomness comes from an injected [`CryptoProvider`].
//!
//! ```rust
//! use std::sync::Arc;
//! use recordvault_keys::{KeyManager, OsCryptoProvider, X25519StaticSecret};
//!
//! let km = KeyManager::new(Arc::new(OsCryptoProvider));
//! let key = km.generate_data_key().unwrap();
//! let sealed = km.encrypt(&key, b"lab result").unwrap();
//!
//! let grantee = X25519StaticSecret::generate();
//! let wrapped = km.wrap_for_principal(&key, &grantee.public_key()).unwrap();
//! let theirs = KeyManager::unwrap(&wrapped, &grantee).unwrap();
//! assert_eq!(km.decrypt(&theirs, &sealed).unwrap(), b"lab result");
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod manager;
pub mod provider;
pub mod wrap;

pub use crypto::{AuthTag, EncryptionNonce, KeyMaterial, X25519PublicKey, X25519StaticSecret};
pub use envelope::{AeadCipher, EnvelopeCodec, SealedPayload};
pub use error::{KeyError, Result};
pub use manager::{DataKey, KeyInfo, KeyManager};
pub use provider::{random_array, CryptoProvider, OsCryptoProvider, SeededCryptoProvider};
pub use wrap::WrappedKey;

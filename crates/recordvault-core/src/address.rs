//! Content addresses.
//!
//! A content address is the hash of the exact bytes a content store holds.
//! The algorithm travels with the digest so that a reader can always recompute
//! and compare, whatever the writer was configured with.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Collision-resistant hash functions usable for content addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 256-bit output.
    #[default]
    Blake3,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Hash `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Blake3 => *blake3::hash(data).as_bytes(),
            HashAlgorithm::Sha256 => Sha256::digest(data).into(),
        }
    }

    /// The identifier used in address strings and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Blake3 => "blake3",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(HashAlgorithm::Blake3),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(CoreError::InvalidAddress(format!(
                "unknown hash algorithm: {}",
                other
            ))),
        }
    }
}

/// Address of a blob: `H(bytes)` together with the `H` that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAddress {
    /// Hash function used.
    pub algorithm: HashAlgorithm,
    /// The digest of the stored bytes.
    pub digest: [u8; 32],
}

impl ContentAddress {
    /// Compute the address of `bytes`.
    pub fn compute(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(bytes),
        }
    }

    /// Check that `bytes` hash to this address.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.algorithm.digest(bytes) == self.digest
    }

    /// Hex-encoded digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Parse an address string of the form `<algorithm>:<hex digest>`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (alg, hex_digest) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidAddress(format!("missing algorithm prefix: {}", s)))?;
        let algorithm = alg.parse()?;
        let bytes = hex::decode(hex_digest)
            .map_err(|e| CoreError::InvalidAddress(format!("bad digest: {}", e)))?;
        let digest: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidAddress("digest must be 32 bytes".into()))?;
        Ok(Self { algorithm, digest })
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.digest_hex())
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContentAddress({}:{})",
            self.algorithm.as_str(),
            &self.digest_hex()[..16]
        )
    }
}

impl FromStr for ContentAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

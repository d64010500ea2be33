//! Vault configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration.

use std::time::Duration;

use recordvault_core::HashAlgorithm;
use recordvault_keys::AeadCipher;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Top-level configuration for an [`AccessController`].
///
/// [`AccessController`]: crate::AccessController
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Hash function the content store addresses blobs with.
    pub hash_function: HashAlgorithm,
    /// AEAD cipher for sealed payloads.
    pub aead_cipher: AeadCipher,
    pub retry_policy: RetryPolicy,
    pub rotation: RotationPolicy,
}

/// Timeout and retry policy for content store and ledger backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first (default: 4)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per retry (default: 50ms)
    pub base_delay_ms: u64,
    /// Upper bound on the delay between retries (default: 2s)
    pub max_delay_ms: u64,
    /// Per-attempt timeout (default: 10s)
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
            timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// What happens to a record's key after a grant is revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Start re-keying the record as soon as a grant is revoked (default: true)
    pub auto_trigger_on_revoke: bool,
    /// Zeroize the superseded key once a re-key commits (default: true)
    pub retire_superseded_keys: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            auto_trigger_on_revoke: true,
            retire_superseded_keys: true,
        }
    }
}

impl VaultConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VaultConfig = serde_json::from_str(json)
            .map_err(|e| VaultError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the retry bounds.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry_policy;
        if retry.max_attempts == 0 {
            return Err(VaultError::Config(
                "retry_policy.max_attempts must be at least 1".into(),
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(VaultError::Config(format!(
                "retry_policy.base_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        if retry.timeout_ms == 0 {
            return Err(VaultError::Config(
                "retry_policy.timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let config = VaultConfig::from_json("{}").unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.hash_function, HashAlgorithm::Blake3);
        assert!(config.rotation.auto_trigger_on_revoke);
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let config = VaultConfig::from_json(
            r#"{
                "hash_function": "sha256",
                "retry_policy": { "max_attempts": 2 },
                "rotation": { "auto_trigger_on_revoke": false }
            }"#,
        )
        .unwrap();

        assert_eq!(config.hash_function, HashAlgorithm::Sha256);
        assert_eq!(config.aead_cipher, AeadCipher::ChaCha20Poly1305);
        assert_eq!(config.retry_policy.max_attempts, 2);
        assert_eq!(config.retry_policy.base_delay_ms, 50);
        assert!(!config.rotation.auto_trigger_on_revoke);
        assert!(config.rotation.retire_superseded_keys);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(matches!(
            VaultConfig::from_json(r#"{ "retry_policy": { "max_attempts": 0 } }"#),
            Err(VaultError::Config(_))
        ));
        assert!(matches!(
            VaultConfig::from_json(
                r#"{ "retry_policy": { "base_delay_ms": 500, "max_delay_ms": 100 } }"#
            ),
            Err(VaultError::Config(_))
        ));
        assert!(matches!(
            VaultConfig::from_json(r#"{ "retry_policy": { "timeout_ms": 0 } }"#),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        assert!(matches!(
            VaultConfig::from_json(r#"{ "aead_cipher": "aes-ecb" }"#),
            Err(VaultError::Config(_))
        ));
    }
}

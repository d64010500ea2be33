//! The key manager: custody of data keys and their rotation history.
//!
//! Raw key material never leaves this crate except sealed inside a
//! [`WrappedKey`]. Callers hold [`DataKey`] handles whose material can only
//! be used through the manager's encrypt, decrypt and wrap operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use recordvault_core::DataKeyId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::{KeyMaterial, X25519PublicKey, X25519StaticSecret};
use crate::envelope::{EnvelopeCodec, SealedPayload};
use crate::error::{KeyError, Result};
use crate::provider::{random_array, CryptoProvider};
use crate::wrap::WrappedKey;

/// An opaque handle to a data key.
#[derive(Clone)]
pub struct DataKey {
    id: DataKeyId,
    version: u32,
    material: KeyMaterial,
}

impl DataKey {
    /// Key id.
    pub fn id(&self) -> DataKeyId {
        self.id
    }

    /// Key version; 1 for a fresh key, incremented by each rotation.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// One-way fingerprint of the material.
    pub fn fingerprint(&self) -> [u8; 32] {
        self.material.fingerprint()
    }

    pub(crate) fn material(&self) -> &KeyMaterial {
        &self.material
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Metadata about a data key, without its material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub data_key_id: DataKeyId,
    pub version: u32,
    pub superseded_by: Option<DataKeyId>,
    pub retired: bool,
}

struct KeyRecord {
    version: u32,
    /// `None` once retired.
    material: Option<KeyMaterial>,
    superseded_by: Option<DataKeyId>,
}

/// Custodian of data keys.
pub struct KeyManager {
    provider: Arc<dyn CryptoProvider>,
    codec: EnvelopeCodec,
    records: RwLock<HashMap<DataKeyId, KeyRecord>>,
}

impl KeyManager {
    /// Create a manager drawing all randomness from `provider`.
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            codec: EnvelopeCodec::new(provider.clone()),
            provider,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// The injected randomness source.
    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// The envelope codec bound to this manager's nonce ledger.
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// Generate a fresh version-1 data key.
    pub fn generate_data_key(&self) -> Result<DataKey> {
        let key = self.fresh_key(1);
        self.write()?.insert(
            key.id,
            KeyRecord {
                version: key.version,
                material: Some(key.material.clone()),
                superseded_by: None,
            },
        );
        debug!(data_key_id = %key.id, "generated data key");
        Ok(key)
    }

    /// Look up a key by id.
    pub fn data_key(&self, id: &DataKeyId) -> Result<DataKey> {
        let records = self.read()?;
        let record = records.get(id).ok_or(KeyError::UnknownDataKey(*id))?;
        let material = record
            .material
            .as_ref()
            .ok_or(KeyError::KeyRetired(*id))?;
        Ok(DataKey {
            id: *id,
            version: record.version,
            material: material.clone(),
        })
    }

    /// Wrap a data key for a grantee's X25519 public key.
    pub fn wrap_for_principal(
        &self,
        data_key: &DataKey,
        grantee: &X25519PublicKey,
    ) -> Result<WrappedKey> {
        WrappedKey::seal(
            self.provider.as_ref(),
            data_key.id,
            data_key.version,
            &data_key.material,
            grantee,
        )
    }

    /// Open a wrapped key with the grantee's secret.
    ///
    /// Runs on the grantee's side and needs no manager state.
    pub fn unwrap(wrapped: &WrappedKey, secret: &X25519StaticSecret) -> Result<DataKey> {
        let material = wrapped.open(secret)?;
        Ok(DataKey {
            id: wrapped.data_key_id,
            version: wrapped.key_version,
            material,
        })
    }

    /// Take custody of a key from its owner's wrapped copy.
    ///
    /// Used after a restart, when the ledger still holds the owner's wrapped
    /// key but this manager has never seen the id. A key already in custody
    /// is left as it is, retired or not.
    pub fn restore(&self, wrapped: &WrappedKey, secret: &X25519StaticSecret) -> Result<DataKey> {
        let key = Self::unwrap(wrapped, secret)?;
        let mut records = self.write()?;
        if !records.contains_key(&key.id) {
            records.insert(
                key.id,
                KeyRecord {
                    version: key.version,
                    material: Some(key.material.clone()),
                    superseded_by: None,
                },
            );
            info!(data_key_id = %key.id, version = key.version, "restored data key");
        }
        Ok(key)
    }

    /// Rotate a key: create its successor and mark it superseded.
    ///
    /// A key can be rotated once. A second rotation of the same key fails
    /// with `AlreadySuperseded` until the first is abandoned. Wrapped keys
    /// already issued for the old key stay valid.
    pub fn rotate(&self, old: &DataKeyId) -> Result<DataKey> {
        let mut records = self.write()?;
        let old_record = records.get(old).ok_or(KeyError::UnknownDataKey(*old))?;
        if let Some(superseded_by) = old_record.superseded_by {
            return Err(KeyError::AlreadySuperseded {
                data_key_id: *old,
                superseded_by,
            });
        }
        if old_record.material.is_none() {
            return Err(KeyError::KeyRetired(*old));
        }

        let key = self.fresh_key(old_record.version + 1);
        records.insert(
            key.id,
            KeyRecord {
                version: key.version,
                material: Some(key.material.clone()),
                superseded_by: None,
            },
        );
        if let Some(old_record) = records.get_mut(old) {
            old_record.superseded_by = Some(key.id);
        }

        info!(
            old_key = %old,
            new_key = %key.id,
            version = key.version,
            "rotated data key"
        );
        Ok(key)
    }

    /// Roll back a rotation that was never committed.
    ///
    /// Drops the new key and makes its predecessor current again.
    pub fn abandon_rotation(&self, new: &DataKeyId) -> Result<()> {
        let mut records = self.write()?;
        if records.remove(new).is_none() {
            return Err(KeyError::UnknownDataKey(*new));
        }
        for record in records.values_mut() {
            if record.superseded_by == Some(*new) {
                record.superseded_by = None;
            }
        }
        drop(records);
        self.codec.forget_key(new)?;

        debug!(data_key_id = %new, "abandoned rotation");
        Ok(())
    }

    /// Zeroize the material of a superseded key.
    pub fn retire(&self, old: &DataKeyId) -> Result<()> {
        let mut records = self.write()?;
        let record = records.get_mut(old).ok_or(KeyError::UnknownDataKey(*old))?;
        if record.superseded_by.is_none() {
            return Err(KeyError::NotSuperseded(*old));
        }
        record.material = None;
        drop(records);
        self.codec.forget_key(old)?;

        info!(data_key_id = %old, "retired data key");
        Ok(())
    }

    /// Follow the supersession chain to the current key.
    pub fn current(&self, id: &DataKeyId) -> Result<DataKeyId> {
        let records = self.read()?;
        let mut current = *id;
        loop {
            let record = records
                .get(&current)
                .ok_or(KeyError::UnknownDataKey(current))?;
            match record.superseded_by {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
    }

    /// Metadata for a key.
    pub fn key_info(&self, id: &DataKeyId) -> Result<KeyInfo> {
        let records = self.read()?;
        let record = records.get(id).ok_or(KeyError::UnknownDataKey(*id))?;
        Ok(KeyInfo {
            data_key_id: *id,
            version: record.version,
            superseded_by: record.superseded_by,
            retired: record.material.is_none(),
        })
    }

    /// Seal a payload under a data key.
    pub fn encrypt(&self, data_key: &DataKey, plaintext: &[u8]) -> Result<SealedPayload> {
        self.codec.encrypt(data_key.id, data_key.material(), plaintext)
    }

    /// Open a payload sealed under `data_key`.
    pub fn decrypt(&self, data_key: &DataKey, sealed: &SealedPayload) -> Result<Vec<u8>> {
        self.codec.decrypt(sealed, data_key.material())
    }

    fn fresh_key(&self, version: u32) -> DataKey {
        DataKey {
            id: DataKeyId::from_bytes(random_array(self.provider.as_ref())),
            version,
            material: KeyMaterial::generate(self.provider.as_ref()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<DataKeyId, KeyRecord>>> {
        self.records.read().map_err(|_| KeyError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<DataKeyId, KeyRecord>>> {
        self.records.write().map_err(|_| KeyError::Poisoned)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.records.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("KeyManager").field("keys", &keys).finish()
    }
}

//! Domain records and their wire representations.

use crate::error::{HubError, HubResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroU32;
use uuid::Uuid;
use vaulthub_crypto::{DevicePublicKey, KdfParams, ProtectedMasterKey, WrappedKey, X25519_KEY_SIZE};

/// Opaque vault identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(String);

impl VaultId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random (UUIDv4) vault id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VaultId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque device identifier, stable per installation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random (UUIDv4) installation id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque user identifier, as issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Vault metadata. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vault {
    pub id: VaultId,
    pub name: String,
    pub kdf: KdfParams,
    /// Master key under the creator's password; never the plaintext key.
    pub protected_key: ProtectedMasterKey,
}

impl Vault {
    pub fn to_dto(&self) -> VaultDto {
        VaultDto {
            name: self.name.clone(),
            masterkey: self.protected_key.to_base64(),
            iterations: self.kdf.iterations.get(),
            salt: STANDARD.encode(&self.kdf.salt),
        }
    }

    pub fn from_dto(id: VaultId, dto: VaultDto) -> HubResult<Self> {
        let iterations = NonZeroU32::new(dto.iterations)
            .ok_or_else(|| HubError::Encoding(format!("vault {id} has zero iterations")))?;
        let salt = decode_base64("salt", &dto.salt)?;
        let protected_key = ProtectedMasterKey::from_base64(&dto.masterkey)?;
        Ok(Self {
            id,
            name: dto.name,
            kdf: KdfParams::new(iterations, salt),
            protected_key,
        })
    }
}

/// A registered device. Only the public key is ever known to the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub public_key: DevicePublicKey,
    /// Set by the hub to the user who registered the device.
    pub owner: Option<UserId>,
}

impl Device {
    pub fn new(id: DeviceId, name: impl Into<String>, public_key: DevicePublicKey) -> Self {
        Self {
            id,
            name: name.into(),
            public_key,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Hex SHA-256 of the public key, for display and log correlation.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.public_key.as_bytes()))
    }

    pub fn to_dto(&self) -> DeviceDto {
        DeviceDto {
            id: self.id.clone(),
            name: self.name.clone(),
            public_key: self.public_key.to_base64(),
            owner: self.owner.clone(),
        }
    }

    pub fn from_dto(dto: DeviceDto) -> HubResult<Self> {
        let public_key = DevicePublicKey::from_base64(&dto.public_key)?;
        Ok(Self {
            id: dto.id,
            name: dto.name,
            public_key,
            owner: dto.owner,
        })
    }
}

/// The per-device artifact granting a device the vault master key.
///
/// At most one exists per `(vault_id, device_id)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRecord {
    pub vault_id: VaultId,
    pub device_id: DeviceId,
    pub wrapped: WrappedKey,
}

impl AccessRecord {
    pub fn to_dto(&self) -> AccessDto {
        AccessDto {
            device_specific_masterkey: STANDARD.encode(&self.wrapped.ciphertext),
            ephemeral_public_key: STANDARD.encode(self.wrapped.ephemeral_public_key),
        }
    }

    pub fn from_dto(vault_id: VaultId, device_id: DeviceId, dto: AccessDto) -> HubResult<Self> {
        let ciphertext = decode_base64("device_specific_masterkey", &dto.device_specific_masterkey)?;
        let epk = decode_base64("ephemeral_public_key", &dto.ephemeral_public_key)?;
        let ephemeral_public_key: [u8; X25519_KEY_SIZE] =
            epk.as_slice().try_into().map_err(|_| {
                HubError::InvalidKeyFormat(format!(
                    "ephemeral public key must be {X25519_KEY_SIZE} bytes, got {}",
                    epk.len()
                ))
            })?;
        Ok(Self {
            vault_id,
            device_id,
            wrapped: WrappedKey {
                ciphertext,
                ephemeral_public_key,
            },
        })
    }
}

fn decode_base64(field: &str, value: &str) -> HubResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| HubError::Encoding(format!("{field} is not base64: {e}")))
}

/// Body of `GET/PUT /vaults/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDto {
    pub name: String,
    pub masterkey: String,
    pub iterations: u32,
    pub salt: String,
}

/// Body of `GET/PUT /vaults/{id}/keys/{device}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDto {
    pub device_specific_masterkey: String,
    pub ephemeral_public_key: String,
}

/// Body of `GET/PUT /devices/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDto {
    pub id: DeviceId,
    pub name: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
}

/// Tokens issued by the identity provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

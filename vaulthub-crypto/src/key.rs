//! Key material: the vault master key and per-device X25519 key pairs.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::aead::OsRng;
use crypto_box::{PublicKey, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the vault master key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an X25519 public or secret key in bytes.
pub const X25519_KEY_SIZE: usize = 32;

/// The symmetric key that encrypts a vault's contents.
///
/// Only ever held in memory by a client that created the vault or unwrapped
/// an access record. Zeroized on drop; `Debug` is redacted and there is no
/// `Serialize` impl, so it cannot leak through logs or wire types.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Generates a new random master key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from decrypted plaintext. Anything but exactly
    /// [`KEY_SIZE`] bytes is treated as a failed authentication, never as a
    /// truncated or padded key.
    pub(crate) fn from_plaintext(plaintext: Zeroizing<Vec<u8>>) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::AuthenticationFailure)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Encodings of the X25519 points of order 1, 2, 4 and 8, with the ignored
/// top bit cleared. Agreement with any of them yields a shared secret an
/// outsider can compute.
const LOW_ORDER_POINTS: [[u8; X25519_KEY_SIZE]; 7] = [
    [0x00; 32],
    [
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ],
    [
        0xe0, 0xeb, 0x7a, 0x7c, 0x3b, 0x41, 0xb8, 0xae, 0x16, 0x56, 0xe3, 0xfa, 0xf1, 0x9f, 0xc4,
        0x6a, 0xda, 0x09, 0x8d, 0xeb, 0x9c, 0x32, 0xb1, 0xfd, 0x86, 0x62, 0x05, 0x16, 0x5f, 0x49,
        0xb8, 0x00,
    ],
    [
        0x5f, 0x9c, 0x95, 0xbc, 0xa3, 0x50, 0x8c, 0x24, 0xb1, 0xd0, 0xb1, 0x55, 0x9c, 0x83, 0xef,
        0x5b, 0x04, 0x44, 0x5c, 0xc4, 0x58, 0x1c, 0x8e, 0x86, 0xd8, 0x22, 0x4e, 0xdd, 0xd0, 0x9f,
        0x11, 0x57,
    ],
    [
        0xec, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0x7f,
    ],
    [
        0xed, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0x7f,
    ],
    [
        0xee, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0x7f,
    ],
];

/// Whether `point` is a low-order X25519 public key (top bit ignored).
pub(crate) fn is_low_order(point: &[u8; X25519_KEY_SIZE]) -> bool {
    let mut masked = *point;
    masked[X25519_KEY_SIZE - 1] &= 0x7f;
    LOW_ORDER_POINTS.contains(&masked)
}

/// A device's long-term X25519 public key.
///
/// Serialized as standard base64, which is how the device registry stores it.
/// Low-order points are rejected on construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DevicePublicKey([u8; X25519_KEY_SIZE]);

impl DevicePublicKey {
    /// Fails with `InvalidKeyFormat` for a low-order point.
    pub fn from_bytes(bytes: [u8; X25519_KEY_SIZE]) -> CryptoResult<Self> {
        if is_low_order(&bytes) {
            return Err(CryptoError::InvalidKeyFormat(
                "public key is a low-order point".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// Parses raw key bytes, rejecting anything that is not a 32-byte
    /// usable point.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; X25519_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyFormat(format!(
                "public key must be {X25519_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("public key is not base64: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; X25519_KEY_SIZE] {
        &self.0
    }

    pub(crate) fn to_x25519(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePublicKey({})", self.to_base64())
    }
}

impl TryFrom<String> for DevicePublicKey {
    type Error = CryptoError;

    fn try_from(value: String) -> CryptoResult<Self> {
        Self::from_base64(&value)
    }
}

impl From<DevicePublicKey> for String {
    fn from(key: DevicePublicKey) -> Self {
        key.to_base64()
    }
}

/// A device's X25519 key pair. The secret half never leaves the device.
///
/// The secret key implements `ZeroizeOnDrop` (from crypto_box).
pub struct DeviceKeyPair {
    secret: SecretKey,
    public: DevicePublicKey,
}

impl DeviceKeyPair {
    /// Generates a fresh key pair for a new device installation.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::generate(&mut OsRng))
    }

    /// Reconstructs a key pair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        Self::from_secret(SecretKey::from(bytes))
    }

    /// Reconstructs a key pair from a secret key slice of unchecked length.
    pub fn from_secret_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; X25519_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyFormat(format!(
                "private key must be {X25519_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_secret_bytes(bytes))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = DevicePublicKey(*secret.public_key().as_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> DevicePublicKey {
        self.public
    }

    /// Returns the secret key bytes in a buffer that is wiped on drop.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; X25519_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

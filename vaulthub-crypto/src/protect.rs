//! Password protection of the master key for vault metadata.
//!
//! Vault metadata never carries the plaintext master key. At creation the
//! key is encrypted under Argon2id(password, salt) with ChaCha20-Poly1305,
//! and the result is what crosses the vault store boundary.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{KEY_SIZE, MasterKey};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use zeroize::Zeroizing;

/// Size of a freshly generated salt.
pub const SALT_SIZE: usize = 16;

/// ChaCha20-Poly1305 nonce size.
pub const NONCE_SIZE: usize = 12;

/// Argon2id memory cost in KiB.
const MEMORY_COST_KIB: u32 = 19 * 1024;

/// Master key derivation parameters, fixed when the vault is created.
///
/// Treated as opaque configuration: `iterations` becomes the Argon2id time
/// cost and `salt` is passed through unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: NonZeroU32,
    pub salt: Vec<u8>,
}

impl KdfParams {
    pub fn new(iterations: NonZeroU32, salt: Vec<u8>) -> Self {
        Self { iterations, salt }
    }

    /// Parameters with a fresh random salt.
    pub fn generate(iterations: NonZeroU32) -> Self {
        let mut salt = vec![0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);
        Self { iterations, salt }
    }

    fn derive(&self, password: &str) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
        let params = Params::new(MEMORY_COST_KIB, self.iterations.get(), 1, Some(KEY_SIZE))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = Zeroizing::new([0u8; KEY_SIZE]);
        argon
            .hash_password_into(password.as_bytes(), &self.salt, out.as_mut_slice())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(out)
    }
}

/// The master key encrypted under a password-derived key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedMasterKey {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl ProtectedMasterKey {
    /// Encodes as base64 of `nonce || ciphertext`, the vault store's format.
    pub fn to_base64(&self) -> String {
        let mut buf = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        STANDARD.encode(buf)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("protected key is not base64: {e}")))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "protected key too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut n = [0u8; NONCE_SIZE];
        n.copy_from_slice(nonce);
        Ok(Self {
            nonce: n,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypts `master_key` under a key derived from `password`.
///
/// `context` is bound as associated data (the vault id), so a protected key
/// copied onto another vault's metadata will not open.
pub fn protect_master_key(
    master_key: &MasterKey,
    password: &str,
    params: &KdfParams,
    context: &[u8],
) -> CryptoResult<ProtectedMasterKey> {
    let kek = params.derive(password)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: master_key.as_bytes(),
                aad: context,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("master key protection failed: {e}")))?;

    Ok(ProtectedMasterKey { nonce, ciphertext })
}

/// Decrypts a protected master key. A wrong password, wrong context or
/// tampered ciphertext all fail with [`CryptoError::AuthenticationFailure`].
pub fn unprotect_master_key(
    protected: &ProtectedMasterKey,
    password: &str,
    params: &KdfParams,
    context: &[u8],
) -> CryptoResult<MasterKey> {
    let kek = params.derive(password)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&protected.nonce),
            Payload {
                msg: &protected.ciphertext,
                aad: context,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    MasterKey::from_plaintext(plaintext)
}

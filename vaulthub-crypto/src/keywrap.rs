//! Per-device wrapping of the vault master key.
//!
//! Uses X25519 key agreement + XSalsa20-Poly1305 (`crypto_box`). Every wrap
//! generates a fresh ephemeral keypair, so repeated grants to the same device
//! are unlinkable and compromising one wrap says nothing about another.
//!
//! The 24-byte nonce is not transmitted. It is derived as
//! `SHA-256(domain || ephemeral_pk || recipient_pk)[..24]`, which makes every
//! bit of the ephemeral key part of the authenticated input. X25519 alone
//! ignores the top bit of a public key; hashing it into the nonce means a
//! flipped bit anywhere still fails the Poly1305 tag.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{DeviceKeyPair, DevicePublicKey, MasterKey, X25519_KEY_SIZE, is_low_order};
use crypto_box::aead::{Aead, OsRng};
use crypto_box::{Nonce, PublicKey, SalsaBox, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const NONCE_DOMAIN: &[u8] = b"vaulthub-keywrap-v1";
const NONCE_SIZE: usize = 24;

/// A master key wrapped for exactly one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedKey {
    /// XSalsa20-Poly1305 ciphertext + Poly1305 tag.
    pub ciphertext: Vec<u8>,
    /// Ephemeral X25519 public key (sender side of the agreement).
    pub ephemeral_public_key: [u8; X25519_KEY_SIZE],
}

fn derive_nonce(ephemeral_pk: &[u8; X25519_KEY_SIZE], recipient_pk: &[u8; X25519_KEY_SIZE]) -> Nonce {
    let digest = Sha256::new()
        .chain_update(NONCE_DOMAIN)
        .chain_update(ephemeral_pk)
        .chain_update(recipient_pk)
        .finalize();
    Nonce::clone_from_slice(&digest[..NONCE_SIZE])
}

/// Wraps `master_key` for the holder of `recipient`'s private key.
pub fn wrap(master_key: &MasterKey, recipient: &DevicePublicKey) -> CryptoResult<WrappedKey> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let ephemeral_pk = *ephemeral.public_key().as_bytes();
    let nonce = derive_nonce(&ephemeral_pk, recipient.as_bytes());

    let salsa_box = SalsaBox::new(&recipient.to_x25519(), &ephemeral);
    let ciphertext = salsa_box
        .encrypt(&nonce, master_key.as_bytes().as_slice())
        .map_err(|e| CryptoError::Encryption(format!("key wrap failed: {e}")))?;

    Ok(WrappedKey {
        ciphertext,
        ephemeral_public_key: ephemeral_pk,
    })
}

/// Wraps `master_key` for a recipient public key given as raw bytes.
///
/// Fails with [`CryptoError::InvalidKeyFormat`] if the key is not 32 bytes.
pub fn wrap_bytes(master_key: &MasterKey, recipient_public_key: &[u8]) -> CryptoResult<WrappedKey> {
    let recipient = DevicePublicKey::from_slice(recipient_public_key)?;
    wrap(master_key, &recipient)
}

/// Recovers the master key from a record wrapped for `recipient`.
///
/// Any tag mismatch (tampering, wrong keypair, truncation) yields
/// [`CryptoError::AuthenticationFailure`]; no partial plaintext is returned.
/// A low-order ephemeral key is [`CryptoError::InvalidKeyFormat`]: anyone can
/// compute that agreement, so such a record proves nothing about its sender.
pub fn unwrap(wrapped: &WrappedKey, recipient: &DeviceKeyPair) -> CryptoResult<MasterKey> {
    if is_low_order(&wrapped.ephemeral_public_key) {
        return Err(CryptoError::InvalidKeyFormat(
            "ephemeral public key is a low-order point".to_string(),
        ));
    }
    let recipient_pk = recipient.public_key();
    let nonce = derive_nonce(&wrapped.ephemeral_public_key, recipient_pk.as_bytes());

    let ephemeral_pk = PublicKey::from(wrapped.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient.secret());
    let plaintext = salsa_box
        .decrypt(&nonce, wrapped.ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    MasterKey::from_plaintext(plaintext)
}

/// Byte-level unwrap for values straight off the wire.
///
/// Length checks on the ephemeral and private keys fail with
/// [`CryptoError::InvalidKeyFormat`]; everything about the ciphertext is left
/// to the authentication tag.
pub fn unwrap_bytes(
    wrapped_key: &[u8],
    ephemeral_public_key: &[u8],
    recipient_private_key: &[u8],
) -> CryptoResult<MasterKey> {
    let ephemeral_public_key: [u8; X25519_KEY_SIZE] =
        ephemeral_public_key.try_into().map_err(|_| {
            CryptoError::InvalidKeyFormat(format!(
                "ephemeral public key must be {X25519_KEY_SIZE} bytes, got {}",
                ephemeral_public_key.len()
            ))
        })?;
    let recipient = DeviceKeyPair::from_secret_slice(recipient_private_key)?;

    let wrapped = WrappedKey {
        ciphertext: wrapped_key.to_vec(),
        ephemeral_public_key,
    };
    unwrap(&wrapped, &recipient)
}

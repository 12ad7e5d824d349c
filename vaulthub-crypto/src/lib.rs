//! Key wrapping layer for VaultHub.
//!
//! A vault has exactly one master key. It reaches each authorized device as
//! an access record the backend stores but cannot read:
//!
//! 1. **Device keys**: every installation owns an X25519 keypair. Only the
//!    public half is ever registered.
//!
//! 2. **Wrap**: the master key is sealed to a device's public key with a
//!    fresh ephemeral X25519 keypair and XSalsa20-Poly1305.
//!
//! 3. **Unwrap**: the device combines its private key with the ephemeral
//!    public key from the record and authenticated-decrypts.
//!
//! 4. **Protection**: vault metadata carries the master key only after
//!    Argon2id + ChaCha20-Poly1305 encryption under the creator's password.

mod error;
mod key;
pub mod keywrap;
pub mod protect;

pub use error::{CryptoError, CryptoResult};
pub use key::{DeviceKeyPair, DevicePublicKey, KEY_SIZE, MasterKey, X25519_KEY_SIZE};
pub use keywrap::{WrappedKey, unwrap, unwrap_bytes, wrap, wrap_bytes};
pub use protect::{
    KdfParams, ProtectedMasterKey, SALT_SIZE, protect_master_key, unprotect_master_key,
};

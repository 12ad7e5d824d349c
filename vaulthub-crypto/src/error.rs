//! Error types for key wrapping and master key protection.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while wrapping, unwrapping or protecting keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Public or private key bytes are malformed (wrong length, bad encoding).
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Ciphertext tag did not verify: tampered data or wrong key.
    #[error("authentication failure (wrong key or tampered data)")]
    AuthenticationFailure,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

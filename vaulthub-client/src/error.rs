//! Hub client error types.

use thiserror::Error;
use vaulthub_crypto::CryptoError;

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Errors that can occur in vault access operations.
///
/// The first five variants are the access-control taxonomy and always reach
/// the caller unmodified; the rest describe the transport around it.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("authentication failure (wrong key or tampered data)")]
    AuthenticationFailure,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("login failed: {0}")]
    AuthFailed(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid resource id: {0:?}")]
    InvalidId(String),
}

impl From<CryptoError> for HubError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyFormat(msg) => HubError::InvalidKeyFormat(msg),
            CryptoError::AuthenticationFailure => HubError::AuthenticationFailure,
            other => HubError::Crypto(other.to_string()),
        }
    }
}

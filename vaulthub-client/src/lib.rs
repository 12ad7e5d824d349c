//! Vault access client for VaultHub.
//!
//! Provides device-level access to vault master keys with:
//! - Per-device access records (wrapped master keys) via [`AccessRegistry`]
//! - The grant / obtain / revoke workflow via [`VaultSession`]
//! - Collaborator traits for the identity provider and backend stores
//! - An HTTP facade for the hub backend ([`HubApiClient`])
//! - An in-memory backend for tests and offline tooling ([`MemoryHub`])

pub mod access_registry;
pub mod api_client;
pub mod config;
pub mod error;
pub mod identity;
pub mod memory;
pub mod session;
pub mod store;
pub mod types;

pub use access_registry::AccessRegistry;
pub use api_client::HubApiClient;
pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use identity::TokenIdentity;
pub use memory::MemoryHub;
pub use session::{KeyPossession, SessionState, VaultSession};
pub use store::{
    AccessRecordStore, DeviceRegistry, HubBackend, IdentityProvider, UserDirectory, VaultStore,
};
pub use types::*;

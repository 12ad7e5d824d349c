//! Shared test helpers for session and registry tests.

#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::Arc;
use vaulthub_client::{Device, DeviceId, HubConfig, MemoryHub, TokenIdentity, VaultId, VaultSession};
use vaulthub_crypto::{DeviceKeyPair, KdfParams, ProtectedMasterKey};

/// Identity holding a valid-looking bearer token.
pub async fn logged_in_identity() -> Arc<TokenIdentity> {
    let identity = TokenIdentity::new(HubConfig::default()).expect("identity must build");
    identity
        .set_tokens("test-access-token".into(), Some("test-refresh-token".into()))
        .await;
    Arc::new(identity)
}

/// Identity with no tokens at all.
pub fn logged_out_identity() -> Arc<TokenIdentity> {
    Arc::new(TokenIdentity::new(HubConfig::default()).expect("identity must build"))
}

/// Cheapest derivation parameters Argon2id accepts.
pub fn fast_kdf() -> KdfParams {
    KdfParams::generate(NonZeroU32::new(1).expect("non-zero"))
}

/// A fresh device with its keypair.
pub fn new_device(name: &str) -> (Device, DeviceKeyPair) {
    let keys = DeviceKeyPair::generate();
    let device = Device::new(DeviceId::generate(), name, keys.public_key());
    (device, keys)
}

/// Vault metadata with a dummy protected key, for registry-level tests that
/// never unlock by password.
pub fn placeholder_vault(id: &VaultId) -> vaulthub_client::Vault {
    vaulthub_client::Vault {
        id: id.clone(),
        name: format!("vault {id}"),
        kdf: fast_kdf(),
        protected_key: ProtectedMasterKey {
            nonce: [0u8; 12],
            ciphertext: vec![0u8; 48],
        },
    }
}

/// Authenticated session over a shared in-memory hub.
pub async fn session(hub: &MemoryHub, vault_id: &VaultId) -> VaultSession {
    session_for(hub.clone(), vault_id).await
}

/// Authenticated session acting as `user` on a shared in-memory hub.
pub async fn session_as(hub: &MemoryHub, user: &str, vault_id: &VaultId) -> VaultSession {
    session_for(hub.as_user(user), vault_id).await
}

async fn session_for(hub: MemoryHub, vault_id: &VaultId) -> VaultSession {
    let mut session = VaultSession::new(vault_id.clone(), logged_in_identity().await, Arc::new(hub));
    session.authenticate().await.expect("authenticate must succeed");
    session
}

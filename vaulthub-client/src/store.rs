//! Collaborator interfaces consumed by the access core.
//!
//! Each call either completes with a result or fails with one error kind.
//! Every mutation is a single atomic write on the collaborator's side; the
//! core never issues multi-step client-side transactions.

use crate::error::HubResult;
use crate::types::{AccessRecord, Device, DeviceId, UserId, Vault, VaultId};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Source of bearer credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current bearer token, or `NotLoggedIn`.
    async fn bearer_token(&self) -> HubResult<String>;

    async fn is_authenticated(&self) -> bool;
}

/// Vault metadata store.
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn get_vault(&self, id: &VaultId) -> HubResult<Vault>;

    /// Creates a vault. Fails with `Conflict` if the id is taken.
    async fn put_vault(&self, vault: &Vault) -> HubResult<()>;
}

/// Per-vault access record store.
#[async_trait]
pub trait AccessRecordStore: Send + Sync {
    async fn get_record(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<AccessRecord>;

    /// Inserts or replaces the record for `(record.vault_id, record.device_id)`.
    async fn put_record(&self, record: &AccessRecord) -> HubResult<()>;

    async fn delete_record(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<()>;

    /// Deletes the records of every device `user_id` owns, in one write.
    async fn delete_user_records(&self, vault_id: &VaultId, user_id: &UserId) -> HubResult<()>;

    /// Devices currently holding a record for the vault.
    async fn list_grantees(&self, vault_id: &VaultId) -> HubResult<BTreeSet<DeviceId>>;
}

/// Device registry.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn get_device(&self, id: &DeviceId) -> HubResult<Device>;

    async fn put_device(&self, device: &Device) -> HubResult<()>;

    async fn list_devices(&self) -> HubResult<Vec<Device>>;
}

/// User identity lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Display name of the logged-in user.
    async fn me(&self) -> HubResult<String>;
}

/// Everything a [`VaultSession`](crate::VaultSession) needs from a backend.
pub trait HubBackend: VaultStore + AccessRecordStore + DeviceRegistry + UserDirectory {}

impl<T> HubBackend for T where T: VaultStore + AccessRecordStore + DeviceRegistry + UserDirectory + ?Sized {}

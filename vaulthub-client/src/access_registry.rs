//! Per-vault registry of device access records.
//!
//! Thin policy layer over an [`AccessRecordStore`]: one record per
//! `(vault, device)`, grants overwrite, revokes are idempotent. The registry
//! trusts its caller; possession checks happen in
//! [`VaultSession`](crate::VaultSession).

use crate::error::{HubError, HubResult};
use crate::store::AccessRecordStore;
use crate::types::{AccessRecord, DeviceId, UserId, VaultId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use vaulthub_crypto::WrappedKey;

pub struct AccessRegistry<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for AccessRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AccessRecordStore + ?Sized> AccessRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Inserts or replaces the device's record in one store write.
    pub async fn grant(
        &self,
        vault_id: &VaultId,
        device_id: &DeviceId,
        wrapped: WrappedKey,
    ) -> HubResult<()> {
        let record = AccessRecord {
            vault_id: vault_id.clone(),
            device_id: device_id.clone(),
            wrapped,
        };
        self.store.put_record(&record).await?;
        debug!("stored access record for device {device_id} in vault {vault_id}");
        Ok(())
    }

    /// Current record for the device, or `NotFound` if never granted or revoked.
    pub async fn fetch(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<AccessRecord> {
        self.store.get_record(vault_id, device_id).await
    }

    /// Deletes the device's record. Revoking an absent grant succeeds.
    pub async fn revoke(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<()> {
        match self.store.delete_record(vault_id, device_id).await {
            Ok(()) | Err(HubError::NotFound(_)) => {
                debug!("access record for device {device_id} in vault {vault_id} removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes the records of every device `user_id` owns. Idempotent like
    /// [`AccessRegistry::revoke`].
    pub async fn revoke_user(&self, vault_id: &VaultId, user_id: &UserId) -> HubResult<()> {
        match self.store.delete_user_records(vault_id, user_id).await {
            Ok(()) | Err(HubError::NotFound(_)) => {
                debug!("access records of user {user_id} in vault {vault_id} removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Devices currently granted access to the vault.
    pub async fn list_devices(&self, vault_id: &VaultId) -> HubResult<BTreeSet<DeviceId>> {
        self.store.list_grantees(vault_id).await
    }
}

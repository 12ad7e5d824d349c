//! In-memory hub backend.
//!
//! Mirrors the hub's referential rules (records need an existing vault and
//! device, vault ids are unique, devices belong to the user who registered
//! them) so sessions behave the same against it as against
//! [`HubApiClient`](crate::HubApiClient). Clones share state; [`MemoryHub::as_user`]
//! gives another user's view of the same hub.

use crate::error::{HubError, HubResult};
use crate::store::{AccessRecordStore, DeviceRegistry, UserDirectory, VaultStore};
use crate::types::{AccessRecord, Device, DeviceId, UserId, Vault, VaultId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct HubState {
    vaults: HashMap<VaultId, Vault>,
    records: HashMap<VaultId, BTreeMap<DeviceId, AccessRecord>>,
    devices: BTreeMap<DeviceId, Device>,
}

/// Thread-safe in-memory implementation of every backend store.
#[derive(Clone)]
pub struct MemoryHub {
    state: Arc<RwLock<HubState>>,
    user: UserId,
}

impl MemoryHub {
    /// An empty hub seen by `user`.
    pub fn new(user: &str) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            user: UserId::new(user),
        }
    }

    /// The same hub, acting as another logged-in user.
    pub fn as_user(&self, user: &str) -> Self {
        Self {
            state: Arc::clone(&self.state),
            user: UserId::new(user),
        }
    }

    /// Total number of access records across all vaults.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.values().map(BTreeMap::len).sum()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new("local")
    }
}

#[async_trait]
impl VaultStore for MemoryHub {
    async fn get_vault(&self, id: &VaultId) -> HubResult<Vault> {
        self.state
            .read()
            .await
            .vaults
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("vault {id}")))
    }

    async fn put_vault(&self, vault: &Vault) -> HubResult<()> {
        let mut state = self.state.write().await;
        if state.vaults.contains_key(&vault.id) {
            return Err(HubError::Conflict(format!("vault {} already exists", vault.id)));
        }
        state.vaults.insert(vault.id.clone(), vault.clone());
        Ok(())
    }
}

#[async_trait]
impl AccessRecordStore for MemoryHub {
    async fn get_record(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<AccessRecord> {
        self.state
            .read()
            .await
            .records
            .get(vault_id)
            .and_then(|records| records.get(device_id))
            .cloned()
            .ok_or_else(|| {
                HubError::NotFound(format!(
                    "no access record for device {device_id} in vault {vault_id}"
                ))
            })
    }

    async fn put_record(&self, record: &AccessRecord) -> HubResult<()> {
        let mut state = self.state.write().await;
        if !state.vaults.contains_key(&record.vault_id) {
            return Err(HubError::NotFound(format!("vault {}", record.vault_id)));
        }
        if !state.devices.contains_key(&record.device_id) {
            return Err(HubError::NotFound(format!("device {}", record.device_id)));
        }
        state
            .records
            .entry(record.vault_id.clone())
            .or_default()
            .insert(record.device_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<()> {
        let mut state = self.state.write().await;
        if let Some(records) = state.records.get_mut(vault_id) {
            records.remove(device_id);
        }
        Ok(())
    }

    async fn delete_user_records(&self, vault_id: &VaultId, user_id: &UserId) -> HubResult<()> {
        let mut state = self.state.write().await;
        let HubState {
            records, devices, ..
        } = &mut *state;
        if let Some(records) = records.get_mut(vault_id) {
            records.retain(|device_id, _| {
                devices
                    .get(device_id)
                    .is_none_or(|d| d.owner.as_ref() != Some(user_id))
            });
        }
        Ok(())
    }

    async fn list_grantees(&self, vault_id: &VaultId) -> HubResult<BTreeSet<DeviceId>> {
        let state = self.state.read().await;
        if !state.vaults.contains_key(vault_id) {
            return Err(HubError::NotFound(format!("vault {vault_id}")));
        }
        Ok(state
            .records
            .get(vault_id)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryHub {
    async fn get_device(&self, id: &DeviceId) -> HubResult<Device> {
        self.state
            .read()
            .await
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("device {id}")))
    }

    async fn put_device(&self, device: &Device) -> HubResult<()> {
        let mut state = self.state.write().await;
        let owned_by_other = state
            .devices
            .get(&device.id)
            .is_some_and(|d| d.owner.as_ref() != Some(&self.user));
        if owned_by_other {
            return Err(HubError::Conflict(format!(
                "device {} is registered to another user",
                device.id
            )));
        }
        let key_taken = state
            .devices
            .values()
            .any(|d| d.id != device.id && d.public_key == device.public_key);
        if key_taken {
            return Err(HubError::Conflict(format!(
                "device {} conflicts with an existing key",
                device.id
            )));
        }
        let device = device.clone().with_owner(self.user.clone());
        state.devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn list_devices(&self) -> HubResult<Vec<Device>> {
        Ok(self.state.read().await.devices.values().cloned().collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryHub {
    async fn me(&self) -> HubResult<String> {
        Ok(self.user.to_string())
    }
}

//! Vault access workflow: authenticate, then create, unlock, grant, obtain
//! or revoke.
//!
//! A session is scoped to one vault and moves through
//! `Unauthenticated -> Authenticated -> KeyObtained | AccessDenied`.
//! Losing the credential at any point (logout, 401) drops it back to
//! `Unauthenticated`, and nothing works until `authenticate()` succeeds again.

use crate::access_registry::AccessRegistry;
use crate::error::{HubError, HubResult};
use crate::store::{HubBackend, IdentityProvider};
use crate::types::{Device, DeviceId, UserId, Vault, VaultId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use vaulthub_crypto::{
    DeviceKeyPair, KdfParams, MasterKey, keywrap, protect_master_key, unprotect_master_key,
};

/// Where a vault-access attempt currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    KeyObtained,
    AccessDenied,
}

/// Proof that the caller holds a vault's plaintext master key.
///
/// Only this crate can mint one: by creating the vault, by unlocking it
/// with its password, or by successfully unwrapping an access record.
/// Granting and revoking require it.
#[derive(Debug)]
pub struct KeyPossession {
    vault_id: VaultId,
    master_key: MasterKey,
}

impl KeyPossession {
    fn new(vault_id: VaultId, master_key: MasterKey) -> Self {
        Self {
            vault_id,
            master_key,
        }
    }

    pub fn vault_id(&self) -> &VaultId {
        &self.vault_id
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }
}

/// One client's access attempt against one vault.
pub struct VaultSession {
    vault_id: VaultId,
    identity: Arc<dyn IdentityProvider>,
    backend: Arc<dyn HubBackend>,
    registry: AccessRegistry<dyn HubBackend>,
    state: SessionState,
}

impl VaultSession {
    pub fn new(
        vault_id: VaultId,
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn HubBackend>,
    ) -> Self {
        let registry = AccessRegistry::new(Arc::clone(&backend));
        Self {
            vault_id,
            identity,
            backend,
            registry,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn vault_id(&self) -> &VaultId {
        &self.vault_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Obtains a bearer credential from the identity provider.
    pub async fn authenticate(&mut self) -> HubResult<()> {
        let authenticated = self.identity.is_authenticated().await
            && self.identity.bearer_token().await.is_ok();
        if !authenticated {
            self.state = SessionState::Unauthenticated;
            warn!("session for vault {} could not authenticate", self.vault_id);
            return Err(HubError::NotLoggedIn);
        }
        self.state = SessionState::Authenticated;
        info!("session for vault {} authenticated", self.vault_id);
        Ok(())
    }

    /// Forgets the session's authentication. Tokens held by the identity
    /// provider are left alone.
    pub fn logout(&mut self) {
        if self.state != SessionState::Unauthenticated {
            info!("session for vault {} logged out", self.vault_id);
        }
        self.state = SessionState::Unauthenticated;
    }

    async fn ensure_authenticated(&mut self) -> HubResult<()> {
        if self.state == SessionState::Unauthenticated || !self.identity.is_authenticated().await {
            self.state = SessionState::Unauthenticated;
            return Err(HubError::NotLoggedIn);
        }
        Ok(())
    }

    /// Passes a backend result through, dropping to `Unauthenticated` if
    /// the backend says the credential is gone.
    fn observe<T>(&mut self, result: HubResult<T>) -> HubResult<T> {
        if matches!(result, Err(HubError::NotLoggedIn)) {
            self.state = SessionState::Unauthenticated;
        }
        result
    }

    fn ensure_possession(&self, possession: &KeyPossession) -> HubResult<()> {
        if possession.vault_id != self.vault_id {
            warn!(
                "rejected key possession for vault {} in session for vault {}",
                possession.vault_id, self.vault_id
            );
            return Err(HubError::NotAuthorized(format!(
                "caller holds no master key for vault {}",
                self.vault_id
            )));
        }
        Ok(())
    }

    fn deny<T>(&mut self, err: HubError) -> HubResult<T> {
        self.state = SessionState::AccessDenied;
        warn!("access to vault {} denied: {err}", self.vault_id);
        Err(err)
    }

    /// A failed tag check ends the attempt in `AccessDenied`; other crypto
    /// errors leave the state alone.
    fn deny_on_auth_failure<T>(&mut self, err: HubError) -> HubResult<T> {
        match err {
            HubError::AuthenticationFailure => self.deny(err),
            other => Err(other),
        }
    }

    /// Creates the vault with a fresh master key protected by `password`.
    ///
    /// The plaintext key never crosses the store boundary.
    pub async fn create_vault(
        &mut self,
        name: &str,
        password: &str,
        kdf: KdfParams,
    ) -> HubResult<KeyPossession> {
        self.ensure_authenticated().await?;

        let master_key = MasterKey::generate();
        let protected_key =
            protect_master_key(&master_key, password, &kdf, self.vault_id.as_str().as_bytes())?;
        let vault = Vault {
            id: self.vault_id.clone(),
            name: name.to_string(),
            kdf,
            protected_key,
        };

        let result = self.backend.put_vault(&vault).await;
        self.observe(result)?;

        self.state = SessionState::KeyObtained;
        info!("created vault {} ({name})", self.vault_id);
        Ok(KeyPossession::new(self.vault_id.clone(), master_key))
    }

    /// Vault metadata as stored by the hub.
    pub async fn vault(&mut self) -> HubResult<Vault> {
        self.ensure_authenticated().await?;
        let result = self.backend.get_vault(&self.vault_id).await;
        self.observe(result)
    }

    /// Recovers the master key from vault metadata with the vault password.
    pub async fn unlock_with_password(&mut self, password: &str) -> HubResult<KeyPossession> {
        let vault = self.vault().await?;
        match unprotect_master_key(
            &vault.protected_key,
            password,
            &vault.kdf,
            self.vault_id.as_str().as_bytes(),
        ) {
            Ok(master_key) => {
                self.state = SessionState::KeyObtained;
                info!("unlocked vault {} with password", self.vault_id);
                Ok(KeyPossession::new(self.vault_id.clone(), master_key))
            }
            Err(e) => self.deny_on_auth_failure(e.into()),
        }
    }

    /// Wraps the master key for a registered device and stores the access
    /// record, replacing any earlier grant to the same device.
    ///
    /// The recipient key comes from the device registry, never from the caller.
    pub async fn grant_access_to(
        &mut self,
        device_id: &DeviceId,
        possession: &KeyPossession,
    ) -> HubResult<()> {
        self.ensure_authenticated().await?;
        self.ensure_possession(possession)?;

        let result = self.backend.get_device(device_id).await;
        let device = self.observe(result)?;

        let wrapped = keywrap::wrap(possession.master_key(), &device.public_key)?;
        let result = self.registry.grant(&self.vault_id, &device.id, wrapped).await;
        self.observe(result)?;

        info!(
            "granted device {} (key {}) access to vault {}",
            device.id,
            &device.fingerprint()[..16],
            self.vault_id
        );
        Ok(())
    }

    /// Fetches this device's access record and unwraps it locally.
    pub async fn obtain_access(
        &mut self,
        device_id: &DeviceId,
        device_keys: &DeviceKeyPair,
    ) -> HubResult<KeyPossession> {
        self.ensure_authenticated().await?;

        let fetched = self.registry.fetch(&self.vault_id, device_id).await;
        let record = match fetched {
            Ok(record) => record,
            Err(e @ HubError::NotFound(_)) => return self.deny(e),
            Err(e) => return self.observe(Err(e)),
        };

        match keywrap::unwrap(&record.wrapped, device_keys) {
            Ok(master_key) => {
                self.state = SessionState::KeyObtained;
                info!("device {device_id} obtained key for vault {}", self.vault_id);
                Ok(KeyPossession::new(self.vault_id.clone(), master_key))
            }
            Err(e) => self.deny_on_auth_failure(e.into()),
        }
    }

    /// Removes the device's access record. Revoking twice is fine.
    pub async fn revoke_access_to(
        &mut self,
        device_id: &DeviceId,
        possession: &KeyPossession,
    ) -> HubResult<()> {
        self.ensure_authenticated().await?;
        self.ensure_possession(possession)?;

        let result = self.registry.revoke(&self.vault_id, device_id).await;
        self.observe(result)?;

        self.member_removed("device", device_id.as_str());
        Ok(())
    }

    /// Removes the access records of every device `user_id` owns, in one
    /// backend call. Revoking a user without grants is fine.
    pub async fn revoke_user_access(
        &mut self,
        user_id: &UserId,
        possession: &KeyPossession,
    ) -> HubResult<()> {
        self.ensure_authenticated().await?;
        self.ensure_possession(possession)?;

        let result = self.registry.revoke_user(&self.vault_id, user_id).await;
        self.observe(result)?;

        self.member_removed("user", user_id.as_str());
        Ok(())
    }

    fn member_removed(&self, authority_kind: &str, authority_id: &str) {
        info!(
            target: "vaulthub::audit",
            event = "VAULT_MEMBER_REMOVE",
            vault_id = %self.vault_id,
            authority_kind,
            authority_id,
            "vault member removed"
        );
    }

    /// Devices currently granted access to this vault.
    pub async fn members(&mut self) -> HubResult<BTreeSet<DeviceId>> {
        self.ensure_authenticated().await?;
        let result = self.registry.list_devices(&self.vault_id).await;
        self.observe(result)
    }

    /// Registers (or renames) a device. Only the public key is sent.
    pub async fn register_device(&mut self, device: &Device) -> HubResult<()> {
        self.ensure_authenticated().await?;
        let result = self.backend.put_device(device).await;
        self.observe(result)?;
        info!("registered device {} ({})", device.id, device.name);
        Ok(())
    }

    pub async fn device(&mut self, device_id: &DeviceId) -> HubResult<Device> {
        self.ensure_authenticated().await?;
        let result = self.backend.get_device(device_id).await;
        self.observe(result)
    }

    pub async fn devices(&mut self) -> HubResult<Vec<Device>> {
        self.ensure_authenticated().await?;
        let result = self.backend.list_devices().await;
        self.observe(result)
    }

    /// Display name of the logged-in user.
    pub async fn current_user(&mut self) -> HubResult<String> {
        self.ensure_authenticated().await?;
        let result = self.backend.me().await;
        self.observe(result)
    }
}

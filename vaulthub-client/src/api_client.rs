//! HTTP facade for the hub backend.
//!
//! Every call first checks the identity provider and fails with
//! `NotLoggedIn` without touching the network. Requests carry the bearer
//! token; status codes are mapped onto the access-control error taxonomy.

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::store::{AccessRecordStore, DeviceRegistry, IdentityProvider, UserDirectory, VaultStore};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the hub's vault, access-key, device and user resources.
pub struct HubApiClient {
    client: Client,
    config: HubConfig,
    identity: Arc<dyn IdentityProvider>,
}

impl HubApiClient {
    pub fn new(config: HubConfig, identity: Arc<dyn IdentityProvider>) -> HubResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            identity,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Builds an authenticated request. Fails before any I/O when logged out
    /// or when an id cannot be carried as a single path segment.
    async fn request(&self, method: Method, url: Url) -> HubResult<RequestBuilder> {
        if !self.identity.is_authenticated().await {
            return Err(HubError::NotLoggedIn);
        }
        let token = self.identity.bearer_token().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    /// Sends a request; a 401 means the credential is no longer valid.
    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> HubResult<Response> {
        let what = format!("{method} {}", url.path());
        let mut builder = self.request(method, url).await?;
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let resp = builder.send().await?;
        debug!("{what} -> {}", resp.status());
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(HubError::NotLoggedIn);
        }
        Ok(resp)
    }

    async fn get(&self, segments: &[&str]) -> HubResult<Response> {
        let url = self.config.url(segments)?;
        self.send(Method::GET, url, None).await
    }

    async fn put(&self, segments: &[&str], body: &impl Serialize) -> HubResult<Response> {
        let url = self.config.url(segments)?;
        self.send(Method::PUT, url, Some(serde_json::to_value(body)?)).await
    }

    async fn delete(&self, segments: &[&str]) -> HubResult<Response> {
        let url = self.config.url(segments)?;
        self.send(Method::DELETE, url, None).await
    }
}

/// Turns an unexpected status into `Api`, keeping the body for diagnostics.
async fn unexpected(resp: Response) -> HubError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    HubError::Api { status, message }
}

#[async_trait]
impl VaultStore for HubApiClient {
    async fn get_vault(&self, id: &VaultId) -> HubResult<Vault> {
        let resp = self.get(&["vaults", id.as_str()]).await?;
        match resp.status() {
            s if s.is_success() => Vault::from_dto(id.clone(), resp.json().await?),
            StatusCode::NOT_FOUND => Err(HubError::NotFound(format!("vault {id}"))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn put_vault(&self, vault: &Vault) -> HubResult<()> {
        let resp = self
            .put(&["vaults", vault.id.as_str()], &vault.to_dto())
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(HubError::Conflict(format!("vault {} already exists", vault.id))),
            StatusCode::FORBIDDEN => Err(HubError::NotAuthorized(format!(
                "not allowed to create vault {}",
                vault.id
            ))),
            _ => Err(unexpected(resp).await),
        }
    }
}

#[async_trait]
impl AccessRecordStore for HubApiClient {
    async fn get_record(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<AccessRecord> {
        let resp = self.get(&["vaults", vault_id.as_str(), "keys", device_id.as_str()]).await?;
        match resp.status() {
            s if s.is_success() => {
                AccessRecord::from_dto(vault_id.clone(), device_id.clone(), resp.json().await?)
            }
            // 403: the device exists but holds no grant. Same outcome for us.
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Err(HubError::NotFound(format!(
                "no access record for device {device_id} in vault {vault_id}"
            ))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn put_record(&self, record: &AccessRecord) -> HubResult<()> {
        let path = [
            "vaults",
            record.vault_id.as_str(),
            "keys",
            record.device_id.as_str(),
        ];
        let resp = self.put(&path, &record.to_dto()).await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(HubError::NotFound(format!(
                "vault {} or device {}",
                record.vault_id, record.device_id
            ))),
            StatusCode::FORBIDDEN => Err(HubError::NotAuthorized(format!(
                "not allowed to grant access to vault {}",
                record.vault_id
            ))),
            // Backends without upsert refuse to replace an existing grant.
            StatusCode::CONFLICT => Err(HubError::Conflict(format!(
                "device {} already holds a grant for vault {}",
                record.device_id, record.vault_id
            ))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn delete_record(&self, vault_id: &VaultId, device_id: &DeviceId) -> HubResult<()> {
        let resp = self
            .delete(&["vaults", vault_id.as_str(), "keys", device_id.as_str()])
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            StatusCode::FORBIDDEN => Err(HubError::NotAuthorized(format!(
                "not allowed to revoke access to vault {vault_id}"
            ))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn delete_user_records(&self, vault_id: &VaultId, user_id: &UserId) -> HubResult<()> {
        let resp = self
            .delete(&["vaults", vault_id.as_str(), "revoke-user", user_id.as_str()])
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            StatusCode::FORBIDDEN => Err(HubError::NotAuthorized(format!(
                "not allowed to revoke access to vault {vault_id}"
            ))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn list_grantees(&self, vault_id: &VaultId) -> HubResult<BTreeSet<DeviceId>> {
        let resp = self.get(&["vaults", vault_id.as_str(), "keys"]).await?;
        match resp.status() {
            s if s.is_success() => {
                #[derive(Deserialize)]
                struct Resp {
                    devices: Vec<DeviceId>,
                }
                let data: Resp = resp.json().await?;
                Ok(data.devices.into_iter().collect())
            }
            StatusCode::NOT_FOUND => Err(HubError::NotFound(format!("vault {vault_id}"))),
            _ => Err(unexpected(resp).await),
        }
    }
}

#[async_trait]
impl DeviceRegistry for HubApiClient {
    async fn get_device(&self, id: &DeviceId) -> HubResult<Device> {
        let resp = self.get(&["devices", id.as_str()]).await?;
        match resp.status() {
            s if s.is_success() => Device::from_dto(resp.json().await?),
            StatusCode::NOT_FOUND => Err(HubError::NotFound(format!("device {id}"))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn put_device(&self, device: &Device) -> HubResult<()> {
        let resp = self
            .put(&["devices", device.id.as_str()], &device.to_dto())
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(HubError::Conflict(format!(
                "device {} conflicts with an existing key",
                device.id
            ))),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn list_devices(&self) -> HubResult<Vec<Device>> {
        // The listing lives at `/devices/`, with the trailing slash.
        let mut url = self.config.url(&["devices"])?;
        url.set_path(&format!("{}/", url.path()));
        let resp = self.send(Method::GET, url, None).await?;
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }
        let dtos: Vec<DeviceDto> = resp.json().await?;
        dtos.into_iter().map(Device::from_dto).collect()
    }
}

#[async_trait]
impl UserDirectory for HubApiClient {
    async fn me(&self) -> HubResult<String> {
        let resp = self.get(&["users", "me"]).await?;
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }
        Ok(resp.text().await?)
    }
}

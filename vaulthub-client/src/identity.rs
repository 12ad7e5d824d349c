//! Bearer token identity backed by an OAuth2 token endpoint.
//!
//! Handles password-grant login and refresh-token rotation. Tokens are kept
//! in memory only; persisting them is the caller's business.

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::store::IdentityProvider;
use crate::types::AuthTokens;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Bumped on every successful refresh so a waiter can tell that a
    /// concurrent refresh already rotated the tokens.
    refresh_generation: u64,
}

/// [`IdentityProvider`] holding tokens issued by the hub's identity server.
pub struct TokenIdentity {
    client: Client,
    config: HubConfig,
    state: Arc<RwLock<TokenState>>,
    /// Serializes refreshes; concurrent callers would otherwise all present
    /// the same refresh token and every one but the first would be rejected.
    refresh_lock: Arc<Mutex<()>>,
}

impl TokenIdentity {
    pub fn new(config: HubConfig) -> HubResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            state: Arc::new(RwLock::new(TokenState::default())),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Sets tokens directly (for restoring a saved session).
    pub async fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let mut state = self.state.write().await;
        state.access_token = Some(access_token);
        state.refresh_token = refresh_token;
    }

    /// Returns current tokens for persistence.
    pub async fn current_tokens(&self) -> Option<AuthTokens> {
        let state = self.state.read().await;
        Some(AuthTokens {
            access_token: state.access_token.clone()?,
            refresh_token: state.refresh_token.clone(),
        })
    }

    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        state.access_token = None;
        state.refresh_token = None;
    }

    /// Logs in with the resource-owner password grant.
    pub async fn login(&self, username: &str, password: &str) -> HubResult<AuthTokens> {
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.config.client_id.as_str()),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!("login for {username} rejected with {status}");
            return Err(HubError::AuthFailed(format!("token endpoint returned {status}")));
        }

        let tokens: AuthTokens = resp.json().await?;
        self.set_tokens(tokens.access_token.clone(), tokens.refresh_token.clone())
            .await;
        info!("logged in as {username}");
        Ok(tokens)
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// A rejected refresh token clears the session and yields `NotLoggedIn`.
    pub async fn refresh(&self) -> HubResult<String> {
        let pre_gen = self.state.read().await.refresh_generation;

        let _guard = self.refresh_lock.lock().await;

        // A concurrent refresh may have completed while we waited.
        {
            let state = self.state.read().await;
            if state.refresh_generation > pre_gen {
                return state.access_token.clone().ok_or(HubError::NotLoggedIn);
            }
        }

        let refresh_token = self
            .state
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or(HubError::NotLoggedIn)?;

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            warn!("refresh token rejected, clearing session");
            self.logout().await;
            return Err(HubError::NotLoggedIn);
        }
        if !resp.status().is_success() {
            return Err(HubError::AuthFailed(format!(
                "token refresh returned {}",
                resp.status()
            )));
        }

        let tokens: AuthTokens = resp.json().await?;
        let mut state = self.state.write().await;
        state.access_token = Some(tokens.access_token.clone());
        if tokens.refresh_token.is_some() {
            state.refresh_token = tokens.refresh_token;
        }
        state.refresh_generation += 1;
        debug!("access token refreshed (generation {})", state.refresh_generation);

        Ok(tokens.access_token)
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentity {
    async fn bearer_token(&self) -> HubResult<String> {
        self.state
            .read()
            .await
            .access_token
            .clone()
            .ok_or(HubError::NotLoggedIn)
    }

    async fn is_authenticated(&self) -> bool {
        self.state.read().await.access_token.is_some()
    }
}

//! Hub client configuration.

use crate::error::{HubError, HubResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Configuration for the hub API client and token identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Base URL of the hub backend (e.g., "https://hub.example.com").
    pub api_base_url: String,

    /// OAuth2 token endpoint of the identity provider.
    pub token_url: String,

    /// OAuth2 client id presented to the token endpoint.
    pub client_id: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:9090".to_string(),
            token_url: "http://localhost:9090/oauth/token".to_string(),
            client_id: "vaulthub-client".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `VAULTHUB_API_URL`, `VAULTHUB_TOKEN_URL`,
    /// `VAULTHUB_CLIENT_ID` and `VAULTHUB_TIMEOUT_SECS`.
    pub fn from_env() -> HubResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`HubConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HubResult<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("VAULTHUB_API_URL") {
            config.api_base_url = url;
        }
        if let Some(url) = lookup("VAULTHUB_TOKEN_URL") {
            config.token_url = url;
        }
        if let Some(id) = lookup("VAULTHUB_CLIENT_ID") {
            config.client_id = id;
        }
        if let Some(secs) = lookup("VAULTHUB_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.parse().map_err(|e| {
                HubError::Config(format!("VAULTHUB_TIMEOUT_SECS must be an integer: {e}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(HubError::Config("api_base_url is empty".to_string()));
        }
        self.base_url()?;
        if self.token_url.trim().is_empty() {
            return Err(HubError::Config("token_url is empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(HubError::Config("request_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    fn base_url(&self) -> HubResult<Url> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| HubError::Config(format!("api_base_url is not a URL: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(HubError::Config(format!(
                "api_base_url cannot carry a path: {}",
                self.api_base_url
            )));
        }
        Ok(url)
    }

    /// Appends `segments` to the base URL, percent-encoding each one so that
    /// `/`, `?`, `#` and `%` inside a segment stay inside it.
    ///
    /// Empty, `.` and `..` segments would address another resource once the
    /// URL is normalized, and the parser strips tabs and newlines before
    /// normalizing, so all of those are refused.
    pub(crate) fn url(&self, segments: &[&str]) -> HubResult<Url> {
        let unusable = |s: &&str| {
            matches!(*s, "" | "." | "..") || s.chars().any(|c| c.is_ascii_control())
        };
        if let Some(bad) = segments.iter().find(|s| unusable(s)) {
            return Err(HubError::InvalidId(bad.to_string()));
        }
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|()| HubError::Config("api_base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

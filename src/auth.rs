//! Authorization backend
//!
//! Tools that act on the user's behalf need a grant the user completes
//! out-of-band, in a browser. The backend hands out the URL inside the
//! suspension payload; here we only wait for the grant to finish.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{AuthConfig, AUTH_API_KEY_ENV};
use crate::{Error, Result};

/// Something that can tell when an authorization has completed
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Block until the authorization completes. Errors when the backend
    /// reports failure or expiry, or cannot be reached.
    async fn wait_for_completion(&self, authorization_id: &str) -> Result<()>;
}

/// Authorization status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: AuthStatus,
}

/// Arcade authorization API client
pub struct ArcadeAuth {
    /// API base URL, without trailing slash
    base_url: String,
    /// HTTP client carrying the API key
    client: reqwest::Client,
    /// Long-poll window requested per status call
    wait: Option<Duration>,
}

impl ArcadeAuth {
    /// Create a new client. Fails if no API key is configured.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Missing {}. Set it in the environment or the config file.",
                    AUTH_API_KEY_ENV
                ))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            wait: config.wait,
        })
    }

    /// One status call; the backend holds it open for up to `wait`
    async fn poll(&self, authorization_id: &str) -> Result<AuthStatus> {
        let url = format!("{}/v1/auth/status", self.base_url);
        let mut query = vec![("id", authorization_id.to_string())];
        if let Some(wait) = self.wait {
            // The backend takes whole seconds; zero would turn the loop into a busy poll
            query.push(("wait", wait.as_secs().max(1).to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Status request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("API error {}: {}", status, body)));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Invalid status response: {}", e)))?;
        Ok(parsed.status)
    }
}

#[async_trait]
impl AuthBackend for ArcadeAuth {
    async fn wait_for_completion(&self, authorization_id: &str) -> Result<()> {
        loop {
            match self.poll(authorization_id).await? {
                AuthStatus::Completed => {
                    info!(authorization = %authorization_id, "Authorization completed");
                    return Ok(());
                }
                AuthStatus::Pending => {
                    debug!(authorization = %authorization_id, "Authorization still pending");
                }
                AuthStatus::Failed => {
                    return Err(Error::Auth(format!(
                        "Authorization {} failed",
                        authorization_id
                    )));
                }
                AuthStatus::Unknown => {
                    return Err(Error::Auth(format!(
                        "Authorization {} returned an unrecognized status",
                        authorization_id
                    )));
                }
            }
        }
    }
}

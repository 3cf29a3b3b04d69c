//! Access tokens for the remote store
//!
//! Tokens come from the client-credentials grant and are cached until
//! shortly before they expire. Concurrent callers share one refresh.

use async_trait::async_trait;
use odv_core::GraphConfig;
use parking_lot::RwLock;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::error::{DriveError, Result};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Source of bearer tokens for remote store requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A valid access token, fetched if the cached one is stale.
    async fn access_token(&self) -> Result<Arc<Secret<String>>>;

    /// Drop the cached token so the next call fetches a new one.
    fn invalidate(&self);
}

struct CachedToken {
    token: Arc<Secret<String>>,
    refresh_at: Instant,
}

/// Single cached token with an expiry skew.
pub struct TokenCache {
    skew: Duration,
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(skew: Duration) -> Self {
        Self {
            skew,
            slot: RwLock::new(None),
        }
    }

    /// The cached token if it is still fresh.
    pub fn get(&self) -> Option<Arc<Secret<String>>> {
        let slot = self.slot.read();
        slot.as_ref()
            .filter(|cached| Instant::now() < cached.refresh_at)
            .map(|cached| Arc::clone(&cached.token))
    }

    /// Store a token valid for `expires_in`. It is considered stale `skew`
    /// before that.
    pub fn store(&self, token: Secret<String>, expires_in: Duration) -> Arc<Secret<String>> {
        let token = Arc::new(token);
        let lifetime = expires_in.saturating_sub(self.skew);
        *self.slot.write() = Some(CachedToken {
            token: Arc::clone(&token),
            refresh_at: Instant::now() + lifetime,
        });
        token
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("skew", &self.skew)
            .field("cached", &self.slot.read().is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Client-credentials grant against the identity platform.
pub struct ClientCredentials {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: Secret<String>,
    cache: TokenCache,
    refresh: Mutex<()>,
}

impl ClientCredentials {
    pub fn new(http: Client, config: &GraphConfig) -> Self {
        Self {
            http,
            token_url: config.resolved_token_url(),
            client_id: config.client_id.clone(),
            client_secret: Secret::new(config.client_secret.expose_secret().clone()),
            cache: TokenCache::new(config.token_skew()),
            refresh: Mutex::new(()),
        }
    }

    #[instrument(skip(self), fields(token_url = %self.token_url))]
    async fn fetch(&self) -> Result<Arc<Secret<String>>> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<TokenErrorResponse>(&body).ok();
            let message = parsed
                .as_ref()
                .and_then(|e| e.error_description.clone())
                .unwrap_or_else(|| format!("token request failed with status {}", status.as_u16()));
            let code = parsed.and_then(|e| e.error);

            return Err(if status.is_server_error() {
                DriveError::Server {
                    status: status.as_u16(),
                    code,
                    message,
                }
            } else {
                DriveError::Auth { code, message }
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(format!("token response: {e}")))?;

        let expires_in = Duration::from_secs(body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        info!(expires_in_secs = expires_in.as_secs(), "Access token acquired");

        Ok(self.cache.store(Secret::new(body.access_token), expires_in))
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn access_token(&self) -> Result<Arc<Secret<String>>> {
        if let Some(token) = self.cache.get() {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(token) = self.cache.get() {
            debug!("Access token refreshed by concurrent caller");
            return Ok(token);
        }

        self.fetch().await
    }

    fn invalidate(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("cache", &self.cache)
            .finish()
    }
}

/// Fixed token, for tests and tools that obtain tokens elsewhere.
pub struct StaticToken(Arc<Secret<String>>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(Secret::new(token.into())))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<Arc<Secret<String>>> {
        Ok(Arc::clone(&self.0))
    }

    fn invalidate(&self) {}
}

/// OAuth token refresh for the linked providers
///
/// Only the refresh-token grant lives here. The interactive authorization
/// flows that mint the first token pair happen outside this service.
use crate::{
    config::ServerConfig,
    error::{FetchError, FetchResult},
    metrics,
    store::Provider,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Access/refresh token pair issued by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn refresh_token(&self, refresh_token: &str) -> FetchResult<TokenPair>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Standard `grant_type=refresh_token` client
pub struct OAuthTokenProvider {
    provider: Provider,
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    /// Whether the provider issues a new refresh token on every refresh
    rotates_refresh_token: bool,
}

impl OAuthTokenProvider {
    pub fn fflogs(http_client: reqwest::Client, config: &ServerConfig) -> Self {
        Self {
            provider: Provider::Fflogs,
            http_client,
            token_url: config.fflogs.token_url.clone(),
            client_id: config.fflogs.client_id.clone(),
            client_secret: None,
            rotates_refresh_token: true,
        }
    }

    pub fn twitch(http_client: reqwest::Client, config: &ServerConfig) -> Self {
        Self {
            provider: Provider::Twitch,
            http_client,
            token_url: config.twitch.token_url.clone(),
            client_id: config.twitch.client_id.clone(),
            client_secret: Some(config.twitch.client_secret.clone()),
            rotates_refresh_token: true,
        }
    }

    /// Google keeps the existing refresh token valid and does not reissue it
    pub fn youtube(http_client: reqwest::Client, config: &ServerConfig) -> Self {
        Self {
            provider: Provider::Youtube,
            http_client,
            token_url: config.youtube.token_url.clone(),
            client_id: config.youtube.client_id.clone(),
            client_secret: Some(config.youtube.client_secret.clone()),
            rotates_refresh_token: false,
        }
    }
}

/// Build the token pair from a token endpoint response
fn token_pair(response: TokenResponse, previous_refresh: &str, rotates: bool) -> FetchResult<TokenPair> {
    let refresh_token = match (rotates, response.refresh_token) {
        (true, Some(token)) => token,
        (true, None) => return Err(FetchError::EmptyResult),
        (false, _) => previous_refresh.to_string(),
    };

    Ok(TokenPair {
        access_token: response.access_token,
        refresh_token,
    })
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn refresh_token(&self, refresh_token: &str) -> FetchResult<TokenPair> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let provider = self.provider.as_str();
        let response = self
            .http_client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!(provider, error = %e, "Token refresh request failed");
                let status = if e.is_timeout() { 504 } else { 502 };
                metrics::record_remote_call(provider, "refresh_token", status);
                FetchError::Transport(status)
            })?;

        let status = response.status().as_u16();
        metrics::record_remote_call(provider, "refresh_token", status);

        if !response.status().is_success() {
            debug!(provider, status, "Token endpoint rejected refresh");
            return Err(FetchError::from_status(status));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            warn!(provider, error = %e, "Unreadable token response");
            FetchError::EmptyResult
        })?;

        token_pair(body, refresh_token, self.rotates_refresh_token)
    }
}

/// Token providers by provider name
pub type TokenProviders = HashMap<Provider, Arc<dyn TokenProvider>>;

/// One refresh client per provider, sharing an HTTP client
pub fn token_providers(http_client: &reqwest::Client, config: &ServerConfig) -> TokenProviders {
    let providers: [Arc<dyn TokenProvider>; 3] = [
        Arc::new(OAuthTokenProvider::fflogs(http_client.clone(), config)),
        Arc::new(OAuthTokenProvider::twitch(http_client.clone(), config)),
        Arc::new(OAuthTokenProvider::youtube(http_client.clone(), config)),
    ];
    providers.into_iter().map(|p| (p.provider(), p)).collect()
}

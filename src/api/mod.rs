/// API routes and handlers
pub mod fflogs;
pub mod health;
pub mod middleware;
pub mod vod;

use crate::{
    context::AppContext,
    error::{FetchError, FetchResult, VodSyncError, VodSyncResult},
    metrics,
    store::{AuthRecord, Provider, ProviderAuth},
};
use axum::Router;
use std::future::Future;
use tracing::{info, warn};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(fflogs::routes())
        .merge(vod::routes())
}

fn provider_label(provider: Provider) -> &'static str {
    match provider {
        Provider::Fflogs => "FFLogs",
        Provider::Twitch => "Twitch",
        Provider::Youtube => "YouTube",
    }
}

/// Interpret a query-string flag the way HTML forms send them
pub(crate) fn flag(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
    }
}

/// Access token for a linked provider
pub(crate) fn linked_token(auths: &AuthRecord, provider: Provider) -> VodSyncResult<String> {
    auths
        .get(provider)
        .map(|auth| auth.token.clone())
        .ok_or_else(|| {
            VodSyncError::Authentication(format!("Not authenticated with {}", provider_label(provider)))
        })
}

/// Refresh a provider's access token after the remote rejected it
///
/// The new pair is persisted before returning. When the refresh itself
/// fails, the provider is unlinked and the caller gets `AuthExpired`.
pub(crate) async fn reauthorize(
    ctx: &AppContext,
    auths: &mut AuthRecord,
    provider: Provider,
) -> VodSyncResult<String> {
    let current = auths.get(provider).cloned().ok_or_else(|| {
        VodSyncError::Authentication(format!("Not authenticated with {}", provider_label(provider)))
    })?;
    let refresher = ctx
        .token_providers
        .get(&provider)
        .cloned()
        .ok_or_else(|| VodSyncError::Internal(format!("No token provider for {}", provider.as_str())))?;

    match refresher.refresh_token(&current.refresh_token).await {
        Ok(pair) => {
            metrics::record_token_refresh(provider.as_str(), true);

            let mut updated = ProviderAuth {
                token: pair.access_token,
                refresh_token: pair.refresh_token,
                ..current
            };
            if provider == Provider::Fflogs {
                if let Some(user) = ctx.report_client.get_username(&updated.token).await {
                    updated.username = Some(user.name);
                    updated.uid = Some(user.id);
                }
            }

            let token = updated.token.clone();
            auths.set(provider, updated);
            ctx.auth_store.store_auth_keys(auths).await?;
            info!(user = %auths.user, provider = provider.as_str(), "Refreshed provider token");

            Ok(token)
        }
        Err(e) => {
            metrics::record_token_refresh(provider.as_str(), false);
            warn!(user = %auths.user, provider = provider.as_str(), error = %e, "Token refresh failed, unlinking provider");

            auths.remove(provider);
            ctx.auth_store.store_auth_keys(auths).await?;

            Err(VodSyncError::Remote(FetchError::AuthExpired))
        }
    }
}

/// Run a remote call with the provider's token, re-authorizing once on `AuthExpired`
pub(crate) async fn with_reauth<T, F, Fut>(
    ctx: &AppContext,
    auths: &mut AuthRecord,
    provider: Provider,
    mut call: F,
) -> VodSyncResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let token = linked_token(auths, provider)?;
    match call(token).await {
        Err(FetchError::AuthExpired) => {
            let token = reauthorize(ctx, auths, provider).await?;
            Ok(call(token).await?)
        }
        other => Ok(other?),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Application context wired to in-memory fakes
    use super::*;
    use crate::{
        auth::issue_session_token,
        config::test_config,
        db,
        fflogs::client::testing::FakeSource,
        oauth::{TokenPair, TokenProvider, TokenProviders},
        store::MemoryDocumentStore,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Token provider that hands out numbered tokens, or always fails
    pub struct FakeTokenProvider {
        pub provider: Provider,
        pub fail: bool,
        pub refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for FakeTokenProvider {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn refresh_token(&self, _refresh_token: &str) -> FetchResult<TokenPair> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(FetchError::Transport(400));
            }
            Ok(TokenPair {
                access_token: format!("fresh-token-{}", n),
                refresh_token: format!("fresh-refresh-{}", n),
            })
        }
    }

    pub struct TestApp {
        pub ctx: AppContext,
        pub source: Arc<FakeSource>,
        pub refresher: Arc<FakeTokenProvider>,
    }

    pub const USER: &str = "raider@example.com";

    pub async fn test_app(source: FakeSource, refresh_fails: bool) -> TestApp {
        let source = Arc::new(source);
        let store = Arc::new(MemoryDocumentStore::new());
        let refresher = Arc::new(FakeTokenProvider {
            provider: Provider::Fflogs,
            fail: refresh_fails,
            refreshes: AtomicUsize::new(0),
        });

        let mut providers = TokenProviders::new();
        for provider in [Provider::Fflogs, Provider::Twitch, Provider::Youtube] {
            let fake: Arc<dyn TokenProvider> = if provider == Provider::Fflogs {
                refresher.clone()
            } else {
                Arc::new(FakeTokenProvider {
                    provider,
                    fail: refresh_fails,
                    refreshes: AtomicUsize::new(0),
                })
            };
            providers.insert(provider, fake);
        }

        let ctx = AppContext::assemble(
            test_config(),
            db::memory_pool().await,
            store,
            source.clone(),
            providers,
            reqwest::Client::new(),
        )
        .await
        .unwrap();

        TestApp {
            ctx,
            source,
            refresher,
        }
    }

    impl TestApp {
        pub async fn link_fflogs(&self, token: &str) {
            let mut record = AuthRecord::new(USER);
            record.set(
                Provider::Fflogs,
                ProviderAuth {
                    token: token.to_string(),
                    refresh_token: "refresh".to_string(),
                    username: None,
                    uid: None,
                },
            );
            self.ctx.auth_store.store_auth_keys(&record).await.unwrap();
        }

        pub fn session(&self) -> String {
            issue_session_token(USER, &self.ctx.config.session.jwt_secret, 3600).unwrap()
        }
    }
}

/// Rate Limiting System
use crate::{
    api::middleware::extract_bearer_token,
    config::RateLimitConfig,
    error::{VodSyncError, VodSyncResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
///
/// Requests carrying a bearer token draw from the authenticated budget,
/// everything else from the smaller anonymous one.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rps);
    Quota::per_second(rps).allow_burst(burst)
}

fn check(limiter: &DirectLimiter) -> VodSyncResult<()> {
    limiter.check().map_err(|_| VodSyncError::RateLimitExceeded {
        retry_after: Duration::from_secs(1),
    })
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = quota(config.authenticated_rps, config.burst_size);
        let unauth_quota = quota(config.unauthenticated_rps, config.burst_size / 4);

        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Check rate limit for an authenticated caller
    pub fn check_authenticated(&self) -> VodSyncResult<()> {
        check(&self.authenticated)
    }

    /// Check rate limit for an anonymous caller
    pub fn check_unauthenticated(&self) -> VodSyncResult<()> {
        check(&self.unauthenticated)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, VodSyncError> {
    if !ctx.rate_limiter.enabled() {
        return Ok(next.run(request).await);
    }

    if extract_bearer_token(request.headers()).is_some() {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
    }

    Ok(next.run(request).await)
}

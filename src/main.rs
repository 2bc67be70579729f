/// VodSync - line up FFLogs pulls with Twitch and YouTube VODs
///
/// Serves combat reports from a local document cache, keeping them
/// incrementally in sync with FFLogs, alongside VOD metadata lookups.

mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod fflogs;
mod metrics;
mod oauth;
mod rate_limit;
mod reports;
mod server;
mod store;
mod vod;

use config::ServerConfig;
use context::AppContext;
use error::{VodSyncError, VodSyncResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lifetime of tokens minted with `issue-token` unless one is given
const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 24 * 3600;

#[tokio::main]
async fn main() -> VodSyncResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vodsync={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // `vodsync issue-token <user> [ttl_secs]` prints a session token and exits
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, user, rest @ ..] = args.as_slice() {
        if command == "issue-token" {
            return issue_token(&config, user, rest.first());
        }
    }

    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn issue_token(config: &ServerConfig, user: &str, ttl: Option<&String>) -> VodSyncResult<()> {
    let ttl_secs = match ttl {
        Some(ttl) => ttl
            .parse()
            .map_err(|_| VodSyncError::Validation(format!("Invalid token lifetime: {}", ttl)))?,
        None => DEFAULT_SESSION_TTL_SECS,
    };

    config.validate()?;
    let token = auth::issue_session_token(user, &config.session.jwt_secret, ttl_secs)?;
    tracing::info!(user, ttl_secs, "Issued session token");
    println!("{}", token);
    Ok(())
}

fn print_banner() {
    println!(
        r#"
 _    __          __ _____
| |  / /___  ____/ // ___/__  ______  _____
| | / / __ \/ __  / \__ \/ / / / __ \/ ___/
| |/ / /_/ / /_/ / ___/ / /_/ / / / / /__
|___/\____/\__,_/ /____/\__, /_/ /_/\___/
                       /____/
        FFLogs x VOD sync v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}

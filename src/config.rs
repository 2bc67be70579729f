/// Configuration management for VodSync
use crate::error::{VodSyncError, VodSyncResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub fflogs: FflogsConfig,
    pub twitch: TwitchConfig,
    pub youtube: YouTubeConfig,
    pub reports: ReportConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public URL the service is reachable at (used for OAuth redirects)
    pub host_url: String,
}

/// Document database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub jwt_secret: String,
}

/// FFLogs API and OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FflogsConfig {
    /// GraphQL endpoint for client (report/world) queries
    pub client_api_url: String,
    /// GraphQL endpoint for user-scoped queries
    pub user_api_url: String,
    pub token_url: String,
    pub client_id: String,
}

/// Twitch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub api_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// YouTube configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub api_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Report synchronization policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Minimum seconds between two refreshes of the same cached report
    pub update_cadence: i64,
    /// Timeout applied to every remote HTTP call, in seconds
    pub http_timeout: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for the service and HTTP tracing when RUST_LOG is unset
    pub level: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> VodSyncResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env_or("VODSYNC_HOSTNAME", "127.0.0.1");
        let port = env_or("VODSYNC_PORT", "5000")
            .parse()
            .map_err(|_| VodSyncError::Validation("Invalid port number".to_string()))?;
        let host_url = env::var("HOST_URL").unwrap_or_else(|_| format!("http://{}:{}", hostname, port));

        let database: PathBuf = env_or("VODSYNC_DATABASE", "./data/vodsync.sqlite").into();
        let max_connections = env_or("VODSYNC_DATABASE_MAX_CONNECTIONS", "10")
            .parse()
            .unwrap_or(10);

        let jwt_secret = env::var("VODSYNC_JWT_SECRET")
            .map_err(|_| VodSyncError::Validation("JWT secret required".to_string()))?;

        let fflogs = FflogsConfig {
            client_api_url: env_or("FFLOGS_CLIENT_API_URL", "https://www.fflogs.com/api/v2/client"),
            user_api_url: env_or("FFLOGS_USER_API_URL", "https://www.fflogs.com/api/v2/user"),
            token_url: env_or("FFLOGS_TOKEN_URL", "https://www.fflogs.com/oauth/token"),
            client_id: env::var("FFLOGS_CLIENT_ID")
                .map_err(|_| VodSyncError::Validation("FFLogs client id required".to_string()))?,
        };

        let twitch = TwitchConfig {
            api_url: env_or("TWITCH_API_URL", "https://api.twitch.tv/helix"),
            token_url: env_or("TWITCH_TOKEN_URL", "https://id.twitch.tv/oauth2/token"),
            client_id: env_or("TWITCH_ID", ""),
            client_secret: env_or("TWITCH_SECRET", ""),
        };

        let youtube = YouTubeConfig {
            api_url: env_or("YOUTUBE_API_URL", "https://www.googleapis.com/youtube/v3"),
            token_url: env_or("YOUTUBE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
            client_id: env_or("YOUTUBE_ID", ""),
            client_secret: env_or("YOUTUBE_SECRET", ""),
        };

        let update_cadence = env_or("UPDATE_CADENCE", "120")
            .parse()
            .map_err(|_| VodSyncError::Validation("Invalid UPDATE_CADENCE".to_string()))?;
        let http_timeout = env_or("VODSYNC_HTTP_TIMEOUT", "10").parse().unwrap_or(10);

        let rate_limit = RateLimitConfig {
            enabled: env_or("VODSYNC_RATE_LIMITS_ENABLED", "true")
                .parse()
                .unwrap_or(true),
            authenticated_rps: env_or("VODSYNC_RATE_LIMIT_AUTHENTICATED_RPS", "20")
                .parse()
                .unwrap_or(20),
            unauthenticated_rps: env_or("VODSYNC_RATE_LIMIT_UNAUTHENTICATED_RPS", "5")
                .parse()
                .unwrap_or(5),
            burst_size: env_or("VODSYNC_RATE_LIMIT_BURST", "20").parse().unwrap_or(20),
        };

        let log_level = env_or("VODSYNC_LOG_LEVEL", "debug");

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                host_url,
            },
            storage: StorageConfig {
                database,
                max_connections,
            },
            session: SessionConfig { jwt_secret },
            fflogs,
            twitch,
            youtube,
            reports: ReportConfig {
                update_cadence,
                http_timeout,
            },
            rate_limit,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> VodSyncResult<()> {
        if self.service.hostname.is_empty() {
            return Err(VodSyncError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.session.jwt_secret.len() < 32 {
            return Err(VodSyncError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.reports.http_timeout == 0 {
            return Err(VodSyncError::Validation(
                "HTTP timeout must be at least one second".to_string(),
            ));
        }

        if self.reports.update_cadence < 0 {
            return Err(VodSyncError::Validation(
                "Update cadence cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 5000,
            host_url: "http://127.0.0.1:5000".to_string(),
        },
        storage: StorageConfig {
            database: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        session: SessionConfig {
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
        },
        fflogs: FflogsConfig {
            client_api_url: "http://fflogs.invalid/api/v2/client".to_string(),
            user_api_url: "http://fflogs.invalid/api/v2/user".to_string(),
            token_url: "http://fflogs.invalid/oauth/token".to_string(),
            client_id: "client".to_string(),
        },
        twitch: TwitchConfig {
            api_url: "http://twitch.invalid/helix".to_string(),
            token_url: "http://twitch.invalid/oauth2/token".to_string(),
            client_id: "twitch".to_string(),
            client_secret: "secret".to_string(),
        },
        youtube: YouTubeConfig {
            api_url: "http://youtube.invalid/youtube/v3".to_string(),
            token_url: "http://youtube.invalid/token".to_string(),
            client_id: "youtube".to_string(),
            client_secret: "secret".to_string(),
        },
        reports: ReportConfig {
            update_cadence: 120,
            http_timeout: 10,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            authenticated_rps: 20,
            unauthenticated_rps: 5,
            burst_size: 20,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_test_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = test_config();
        config.session.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = test_config();
        config.reports.http_timeout = 0;
        assert!(config.validate().is_err());
    }
}

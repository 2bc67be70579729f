/// Authentication extractors and utilities
///
/// Callers identify themselves with an HS256 session JWT whose `sub` claim
/// is the user's email, the key of their auth record.
use crate::{api::middleware::extract_bearer_token, context::AppContext, error::VodSyncError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User email
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Authenticated context - extracts and validates the session from the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = VodSyncError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| VodSyncError::Authentication("Missing authorization header".to_string()))?;

        let claims = verify_session_token(&token, &state.config.session.jwt_secret)?;

        Ok(AuthContext { user: claims.sub })
    }
}

/// Verify a session JWT
///
/// Checks the signature and expiry (with five minutes of clock skew) and
/// requires a non-empty subject.
pub fn verify_session_token(token: &str, jwt_secret: &str) -> Result<SessionClaims, VodSyncError> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 300;

    let data = decode::<SessionClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("Session token verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                VodSyncError::Authentication("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                VodSyncError::Authentication("Invalid token signature".to_string())
            }
            _ => VodSyncError::Authentication(format!("Invalid token: {}", e)),
        }
    })?;

    if data.claims.sub.is_empty() {
        return Err(VodSyncError::Authentication("Token has no subject".to_string()));
    }

    Ok(data.claims)
}

/// Issue a session JWT for `user`, valid for `ttl_secs`
pub fn issue_session_token(user: &str, jwt_secret: &str, ttl_secs: i64) -> Result<String, VodSyncError> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = SessionClaims {
        sub: user.to_string(),
        exp: now + ttl_secs,
        iat: now,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))
        .map_err(|e| VodSyncError::Internal(format!("Failed to sign session token: {}", e)))
}

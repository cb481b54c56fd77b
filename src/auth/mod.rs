/*!
 * # Authentication and Authorization Module
 *
 * Sessions are HS256 bearer JWTs issued by the identity provider; the `sub`
 * claim is the user's id, which is also the primary key of their profile.
 * Admin access is decided by the profile's `role` column, not by token claims.
 *
 * - [`AuthUser`] rejects anonymous requests with 401
 * - [`MaybeUser`] lets anonymous requests through
 * - [`AdminUser`] additionally requires an admin profile (403 otherwise)
 * - [`verify_cron_secret`] guards the scheduled-job endpoints
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::AppConfig, entities::profile, services::payments::constant_time_eq};

/// Claim structure for session tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Caller that may be anonymous. Malformed or expired tokens count as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

/// Caller whose profile carries the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_issuer: cfg.jwt_issuer.clone(),
        }
    }
}

/// Validates session tokens and resolves profile roles
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Signs a session token. Production tokens come from the identity
    /// provider; this is used by the seeding tool and tests.
    pub fn issue_token(
        &self,
        user_id: Uuid,
        email: Option<String>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.jwt_issuer.clone(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            email: claims.email,
        })
    }

    /// A missing profile is not an admin
    pub async fn is_admin(&self, user_id: Uuid) -> Result<bool, AuthError> {
        let profile = profile::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        Ok(profile.map(|p| p.is_admin()).unwrap_or(false))
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingAuth)?;
        self.validate_token(token)
    }
}

/// The token of an `Authorization: Bearer ...` header; the scheme is matched
/// case-insensitively
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Shared-secret check for scheduled jobs. Rejects everything when no secret
/// is configured.
pub fn verify_cron_secret(headers: &HeaderMap, secret: Option<&str>) -> Result<(), AuthError> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        warn!("cron secret not configured, rejecting scheduled call");
        return Err(AuthError::MissingAuth);
    };
    match bearer_token(headers) {
        Some(token) if constant_time_eq(token, secret) => Ok(()),
        Some(_) => Err(AuthError::InvalidToken),
        None => Err(AuthError::MissingAuth),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let user = auth.authenticate(&parts.headers)?;
        debug!(user_id = %user.user_id, "request authenticated");
        Ok(user)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        Ok(MaybeUser(auth.authenticate(&parts.headers).ok()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let user = auth.authenticate(&parts.headers)?;
        if !auth.is_admin(user.user_id).await? {
            warn!(user_id = %user.user_id, "non-admin attempted admin access");
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminUser(user))
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::DatabaseError(msg) => {
                warn!(error = %msg, "profile lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUTH_DATABASE_ERROR",
                    "Authorization check failed".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

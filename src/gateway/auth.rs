use crate::config::{AuthConfig, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Authorization token required")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token signing failed: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),
    #[error("credential check failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Hash(_) | AuthError::Token(_) | AuthError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub role: String,
}

struct StoredUser {
    profile: UserProfile,
    password_hash: String,
}

// ============================================================================
// Credential Store
// ============================================================================

/// Operator accounts and token signing keys.
pub struct CredentialStore {
    users: HashMap<String, StoredUser>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl CredentialStore {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let cost = config.bcrypt_cost;
        let secret = match config.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                warn!("No JWT secret configured; issued tokens will not survive a restart");
                let mut bytes = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes
            }
        };

        let mut users = HashMap::new();
        for (idx, user) in config.users.iter().enumerate() {
            let password_hash = match (&user.password_hash, &user.password) {
                (Some(hash), _) => hash.clone(),
                (None, Some(password)) => bcrypt::hash(password, cost)?,
                (None, None) => {
                    warn!("Skipping user '{}' with no password", user.username);
                    continue;
                }
            };
            users.insert(
                user.username.clone(),
                StoredUser {
                    profile: UserProfile {
                        id: idx as u64 + 1,
                        username: user.username.clone(),
                        role: user.role.clone(),
                    },
                    password_hash,
                },
            );
        }

        if users.is_empty() {
            warn!(
                "No users configured; seeding default '{}' account. Change its password.",
                DEFAULT_ADMIN_USERNAME
            );
            users.insert(
                DEFAULT_ADMIN_USERNAME.to_string(),
                StoredUser {
                    profile: UserProfile {
                        id: 1,
                        username: DEFAULT_ADMIN_USERNAME.to_string(),
                        role: "admin".to_string(),
                    },
                    password_hash: bcrypt::hash(DEFAULT_ADMIN_PASSWORD, cost)?,
                },
            );
        }

        Ok(Self {
            users,
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
            ttl: chrono::Duration::hours(config.token_ttl_hours),
        })
    }

    /// Check a username/password pair and issue a token.
    pub fn login(&self, username: &str, password: &str) -> Result<(String, UserProfile), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let user = self.users.get(username).ok_or(AuthError::InvalidCredentials)?;
        if !bcrypt::verify(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.issue_token(&user.profile)?;
        debug!("Issued token for '{}'", username);
        Ok((token, user.profile.clone()))
    }

    pub fn issue_token(&self, profile: &UserProfile) -> Result<String, AuthError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: profile.id.to_string(),
            username: profile.username.clone(),
            role: profile.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::Token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })
    }

    /// Validate the `Authorization: Bearer` header of a request.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }

    pub fn profile(&self, username: &str) -> Option<UserProfile> {
        self.users.get(username).map(|u| u.profile.clone())
    }
}

/// Extract bearer token from an Authorization header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    if header.len() > 7 && header[..7].eq_ignore_ascii_case("bearer ") {
        Some(header[7..].trim())
    } else {
        None
    }
}

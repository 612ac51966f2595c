use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::config::{AuthConfig, OAuthConfig, OAuthProviderConfig};
use crate::db::{SessionStore, User, UserSession, UserStore};
use crate::error::{AppError, AuthError, DatabaseError, UpstreamError};
use crate::Result;

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    provider: String,
    nonce: String,
    exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Microsoft,
}

impl OAuthProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(OAuthProvider::Google),
            "microsoft" => Some(OAuthProvider::Microsoft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity returned by a provider's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

impl OAuthIdentity {
    /// Google answers with `sub`/`email`/`name`, Microsoft Graph with
    /// `id`/`mail`/`displayName`.
    pub fn from_userinfo(value: &Value) -> Option<Self> {
        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| value.get(*k).and_then(Value::as_str))
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            id: text(&["sub", "id"])?,
            email: text(&["email", "mail", "userPrincipalName"])?,
            name: text(&["name", "displayName"]),
        })
    }
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    jwt_secret: String,
    token_expiry_hours: i64,
    oauth: OAuthConfig,
    http: reqwest::Client,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        auth: &AuthConfig,
        oauth: OAuthConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(oauth.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build OAuth HTTP client: {}", e)))?;

        Ok(Self {
            users,
            sessions,
            jwt_secret: auth.jwt_secret.clone(),
            token_expiry_hours: auth.token_expiry_hours,
            oauth,
            http,
        })
    }

    pub async fn register(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<User> {
        let email = email.trim().to_lowercase();
        if email.len() < 3 || !email.contains('@') {
            return Err(AppError::ValidationError("A valid email address is required".into()));
        }
        validate_password_strength(password)?;

        if self.users.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }

        let mut user = User::new(email, display_name.map(str::to_string));
        user.password_hash = Some(hash_password(password)?);

        let user = self.users.create_user(&user).await?;
        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Email/password login. Returns a session token and the user.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(String, User)> {
        let user = self
            .users
            .get_user_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // OAuth-only accounts have no password to check.
        let hash = user.password_hash.as_deref().ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        self.users.record_login(user.id).await?;
        let token = self.start_session(&user).await?;
        Ok((token, user))
    }

    pub async fn validate_token(&self, token: &str) -> Result<User> {
        // First check if session exists and is not expired
        let session = self
            .sessions
            .get_session_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if session.is_expired() {
            return Err(AuthError::TokenExpired.into());
        }

        let claims = self.decode_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub)?;

        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.sessions.update_session_activity(token).await?;

        Ok(user)
    }

    pub async fn invalidate_token(&self, token: &str) -> Result<()> {
        self.sessions.delete_session(token).await
    }

    pub async fn cleanup_sessions(&self) -> Result<u64> {
        self.sessions.cleanup_expired_sessions().await
    }

    fn provider_config(&self, provider: OAuthProvider) -> Result<&OAuthProviderConfig> {
        let config = match provider {
            OAuthProvider::Google => &self.oauth.google,
            OAuthProvider::Microsoft => &self.oauth.microsoft,
        };

        if config.is_configured() {
            Ok(config)
        } else {
            Err(UpstreamError::Unavailable(format!("{} sign-in", provider)).into())
        }
    }

    fn redirect_uri(&self, provider: OAuthProvider) -> String {
        format!(
            "{}/auth/oauth/{}/callback",
            self.oauth.redirect_base.trim_end_matches('/'),
            provider
        )
    }

    /// Provider consent URL carrying a signed, short-lived state value.
    pub fn authorize_url(&self, provider: OAuthProvider) -> Result<String> {
        let config = self.provider_config(provider)?;

        let state = OAuthState {
            provider: provider.as_str().to_string(),
            nonce: Uuid::new_v4().to_string(),
            exp: (Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp(),
        };
        let state = encode(
            &Header::default(),
            &state,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        let url = url::Url::parse_with_params(
            &config.auth_url,
            &[
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", self.redirect_uri(provider).as_str()),
                ("response_type", "code"),
                ("scope", config.scopes.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AppError::ConfigError(format!("Invalid OAuth authorize URL: {}", e)))?;

        Ok(url.into())
    }

    /// Completes an OAuth login: verifies state, exchanges the code, then
    /// finds the user by provider identity, links an existing account with
    /// the same email, or creates a new one.
    pub async fn authenticate_oauth(&self, provider: OAuthProvider, code: &str, state: &str) -> Result<(String, User)> {
        let claims = decode::<OAuthState>(
            state,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?
        .claims;
        if claims.provider != provider.as_str() {
            return Err(AuthError::InvalidToken.into());
        }

        let access_token = self.exchange_code_for_token(provider, code).await?;
        let identity = self.fetch_identity(provider, &access_token).await?;

        let user = match self.users.get_user_by_oauth(provider.as_str(), &identity.id).await? {
            Some(user) => user,
            None => match self.users.get_user_by_email(&identity.email).await? {
                Some(existing) => {
                    self.users
                        .link_oauth_identity(existing.id, provider.as_str(), &identity.id)
                        .await?;
                    info!(user_id = %existing.id, %provider, "Linked OAuth identity to existing account");
                    existing
                }
                None => {
                    let mut user = User::new(identity.email.to_lowercase(), identity.name.clone());
                    user.oauth_provider = Some(provider.as_str().to_string());
                    user.oauth_id = Some(identity.id.clone());
                    let user = self.users.create_user(&user).await?;
                    info!(user_id = %user.id, %provider, "User registered via OAuth");
                    user
                }
            },
        };

        self.users.record_login(user.id).await?;
        let token = self.start_session(&user).await?;
        Ok((token, user))
    }

    async fn start_session(&self, user: &User) -> Result<String> {
        let token = self.generate_token(&user.id.to_string())?;
        let session = UserSession::new(user.id, token.clone(), self.token_expiry_hours);
        self.sessions.create_session(&session).await?;
        Ok(token)
    }

    fn generate_token(&self, user_id: &str) -> Result<String> {
        let now = Utc::now();
        let exp = (now + Duration::hours(self.token_expiry_hours)).timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    fn decode_token(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        Ok(claims.claims)
    }

    async fn exchange_code_for_token(&self, provider: OAuthProvider, code: &str) -> Result<String> {
        let config = self.provider_config(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let res = self
            .http
            .post(&config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            warn!(%provider, status, "OAuth token exchange rejected");
            return Err(UpstreamError::BadStatus { service: format!("{} oauth", provider), status }.into());
        }

        let token_response: Value = res.json().await?;
        let access_token = token_response["access_token"]
            .as_str()
            .ok_or_else(|| UpstreamError::RequestFailed("OAuth token response had no access_token".into()))?;

        Ok(access_token.to_string())
    }

    async fn fetch_identity(&self, provider: OAuthProvider, access_token: &str) -> Result<OAuthIdentity> {
        let config = self.provider_config(provider)?;
        let res = self
            .http
            .get(&config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            return Err(UpstreamError::BadStatus { service: format!("{} userinfo", provider), status }.into());
        }

        let body: Value = res.json().await?;
        OAuthIdentity::from_userinfo(&body).ok_or_else(|| {
            UpstreamError::RequestFailed(format!("{} userinfo lacked id or email", provider)).into()
        })
    }
}

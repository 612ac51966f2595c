use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{OAuthConfig, PlatformOAuthConfig, PlatformOAuthSettings};
use crate::db::{User, UserStore};
use crate::error::{AppError, AuthError, UpstreamError};
use crate::integrations::platforms::Platform;
use crate::Result;

const CONNECT_STATE_TTL_MINUTES: i64 = 10;

/// Signed `state` parameter binding a consent round trip to one user and
/// one platform.
#[derive(Debug, Serialize, Deserialize)]
struct ConnectState {
    sub: String,
    platform: String,
    nonce: String,
    exp: i64,
}

/// Runs the authorization-code flow that lets a user connect an export
/// platform without pasting an access token.
pub struct PlatformAuthorizer {
    users: Arc<dyn UserStore>,
    platforms: PlatformOAuthSettings,
    redirect_base: String,
    jwt_secret: String,
    http: reqwest::Client,
}

impl PlatformAuthorizer {
    pub fn new(
        users: Arc<dyn UserStore>,
        platforms: PlatformOAuthSettings,
        oauth: &OAuthConfig,
        jwt_secret: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(oauth.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build platform OAuth client: {}", e)))?;

        Ok(Self {
            users,
            platforms,
            redirect_base: oauth.redirect_base.trim_end_matches('/').to_string(),
            jwt_secret: jwt_secret.to_string(),
            http,
        })
    }

    fn platform_config(&self, platform: Platform) -> Result<&PlatformOAuthConfig> {
        let config = match platform {
            Platform::Monday => &self.platforms.monday,
            Platform::Smartsheet => &self.platforms.smartsheet,
            Platform::GoogleSheets => &self.platforms.google_sheets,
            Platform::Microsoft365 => &self.platforms.microsoft365,
        };

        if config.is_configured() {
            Ok(config)
        } else {
            Err(UpstreamError::Unavailable(format!("{} connection", platform.display_name())).into())
        }
    }

    fn redirect_uri(&self, platform: Platform) -> String {
        format!("{}/api/integrations/{}/callback", self.redirect_base, platform)
    }

    /// Platform consent URL whose state names `user_id`.
    pub fn authorize_url(&self, user_id: Uuid, platform: Platform) -> Result<String> {
        let config = self.platform_config(platform)?;

        let state = ConnectState {
            sub: user_id.to_string(),
            platform: platform.as_str().to_string(),
            nonce: Uuid::new_v4().to_string(),
            exp: (Utc::now() + Duration::minutes(CONNECT_STATE_TTL_MINUTES)).timestamp(),
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
                ("redirect_uri", self.redirect_uri(platform).as_str()),
                ("response_type", "code"),
                ("scope", config.scopes.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AppError::ConfigError(format!("Invalid platform authorize URL: {}", e)))?;

        Ok(url.into())
    }

    /// Verifies a callback `state` issued for `platform` and loads the user
    /// it names.
    pub async fn authorized_user(&self, platform: Platform, state: &str) -> Result<User> {
        let claims = decode::<ConnectState>(
            state,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?
        .claims;
        if claims.platform != platform.as_str() {
            return Err(AuthError::InvalidToken.into());
        }

        let user_id = Uuid::parse_str(&claims.sub)?;
        self.users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::InvalidToken.into())
    }

    /// Trades an authorization code for the platform access token.
    pub async fn exchange_code(&self, platform: Platform, code: &str) -> Result<String> {
        let config = self.platform_config(platform)?;
        let redirect_uri = self.redirect_uri(platform);

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
            warn!(%platform, status, "Platform token exchange rejected");
            return Err(UpstreamError::BadStatus { service: format!("{} oauth", platform), status }.into());
        }

        let body: Value = res.json().await?;
        let token = body["access_token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UpstreamError::RequestFailed(format!("{} token response had no access_token", platform)))?;

        info!(%platform, "Platform authorization code exchanged");
        Ok(token.to_string())
    }
}

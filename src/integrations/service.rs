use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ai::GeneratedDocument;
use crate::db::{CredentialStore, IntegrationCredential};
use crate::error::AppError;
use crate::integrations::client::{ExportResult, PlatformExporter};
use crate::integrations::platforms::Platform;
use crate::integrations::vault::{SealedToken, TokenVault};
use crate::Result;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub platform: Platform,
    pub name: &'static str,
    pub connected: bool,
}

pub struct IntegrationService {
    credentials: Arc<dyn CredentialStore>,
    vault: TokenVault,
    exporter: Arc<dyn PlatformExporter>,
}

impl IntegrationService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        vault: TokenVault,
        exporter: Arc<dyn PlatformExporter>,
    ) -> Self {
        Self { credentials, vault, exporter }
    }

    pub async fn status(&self, user_id: Uuid) -> Result<Vec<ConnectionStatus>> {
        let connected = self.credentials.connected_platforms(user_id).await?;
        Ok(Platform::ALL
            .into_iter()
            .map(|platform| ConnectionStatus {
                platform,
                name: platform.display_name(),
                connected: connected.iter().any(|p| p == platform.as_str()),
            })
            .collect())
    }

    /// Stores the user's access token for `platform`, replacing any previous one.
    pub async fn connect(&self, user_id: Uuid, platform: Platform, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::ValidationError("Access token is required".into()));
        }

        let sealed = self.vault.seal(token)?;
        let now = Utc::now();
        self.credentials
            .upsert_credential(&IntegrationCredential {
                user_id,
                platform: platform.as_str().to_string(),
                encrypted_token: sealed.ciphertext,
                nonce: sealed.nonce,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(%user_id, %platform, "Platform connected");
        Ok(())
    }

    pub async fn disconnect(&self, user_id: Uuid, platform: Platform) -> Result<()> {
        if !self.credentials.delete_credential(user_id, platform.as_str()).await? {
            return Err(AppError::NotFound(format!("{} connection", platform.display_name())));
        }
        info!(%user_id, %platform, "Platform disconnected");
        Ok(())
    }

    pub async fn export(
        &self,
        user_id: Uuid,
        platform: Platform,
        document: &GeneratedDocument,
    ) -> Result<ExportResult> {
        let credential = self
            .credentials
            .get_credential(user_id, platform.as_str())
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(format!("Connect {} before exporting", platform.display_name()))
            })?;

        let token = self.vault.open(&SealedToken {
            ciphertext: credential.encrypted_token,
            nonce: credential.nonce,
        })?;

        let result = self.exporter.export(platform, &token, document).await?;
        info!(%user_id, %platform, external_id = %result.external_id, "Document exported");
        Ok(result)
    }
}

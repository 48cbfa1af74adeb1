//! Secret CRUD.
//!
//! Values are sealed under the current default DEK on write. A read that
//! observes an older DEK returns the plaintext immediately and schedules a
//! background re-encryption under the default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use sealbox_envelope::EnvelopeError;
use sealbox_keyring::KeyringError;
use sealbox_storage::{FolderId, NewSecret, SecretId, SecretRecord, Store, StoreError};

use crate::error::{for_entity, ApiError};
use crate::server::SealboxServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretRequest {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSecretRequest {
    pub value: String,
}

/// A secret with its decrypted value.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    pub id: Uuid,
    pub name: String,
    pub data: String,
    pub dek_id: u32,
    pub folder_id: Option<Uuid>,
    pub last_rotation: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry: metadata only, no plaintext.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSummary {
    pub id: Uuid,
    pub name: String,
    pub dek_id: u32,
    pub folder_id: Option<Uuid>,
    pub last_rotation: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SecretRecord> for SecretSummary {
    fn from(s: SecretRecord) -> Self {
        Self {
            id: s.id.0,
            name: s.name,
            dek_id: s.dek_id,
            folder_id: s.folder_id.map(|f| f.0),
            last_rotation: s.last_rotation,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

fn validate_secret_name(name: &str) -> Result<(), ApiError> {
    if name.len() < 3 {
        return Err(ApiError::Validation(
            "secret name must be at least 3 characters".to_string(),
        ));
    }
    if name.len() > 255 {
        return Err(ApiError::Validation(
            "secret name must be at most 255 characters".to_string(),
        ));
    }
    if name.contains(' ') || name.contains('@') {
        return Err(ApiError::Validation(
            "secret name must not contain spaces or '@'".to_string(),
        ));
    }
    Ok(())
}

fn validate_secret_value(value: &str) -> Result<(), ApiError> {
    if value.len() < 8 {
        return Err(ApiError::Validation(
            "secret value must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

/// Decryption failures surface as AuthenticationFailure with the DEK id;
/// the plaintext never reaches a log line.
fn map_open_error(e: KeyringError, dek_id: u32) -> ApiError {
    match e {
        KeyringError::Envelope(EnvelopeError::Decrypt(_)) => {
            error!(dek = dek_id, "secret failed AEAD authentication");
            ApiError::AuthenticationFailure { dek_id }
        }
        other => other.into(),
    }
}

impl SealboxServer {
    /// POST /secret
    pub async fn create_secret(
        &self,
        bearer: Option<&str>,
        req: CreateSecretRequest,
    ) -> Result<SecretResponse, ApiError> {
        self.authenticate(bearer).await?;
        validate_secret_name(&req.name)?;
        validate_secret_value(&req.value)?;

        let folder_id = match req.folder_id {
            Some(id) => {
                let folder_id = FolderId(id);
                self.store
                    .get_folder(&folder_id)
                    .await
                    .map_err(for_entity("folder"))?;
                Some(folder_id)
            }
            None => None,
        };

        let (data, dek_id) = self.keys.seal(req.value.as_bytes(), None)?;

        let record = self
            .store
            .create_secret(&NewSecret {
                name: req.name,
                data,
                dek_id,
                folder_id,
            })
            .await
            .map_err(for_entity("secret"))?;

        info!(secret = %record.id, dek = dek_id, "created secret");
        Ok(self.secret_response(record, req.value))
    }

    /// GET /secret/{id-or-name}
    ///
    /// Decrypts with the DEK named by the row, verifying it matches the
    /// envelope header. If that DEK is no longer the default, the plaintext
    /// is returned immediately and a background re-encryption is scheduled;
    /// the read neither waits for nor can be failed by it.
    pub async fn get_secret(
        &self,
        bearer: Option<&str>,
        id_or_name: &str,
    ) -> Result<SecretResponse, ApiError> {
        self.authenticate(bearer).await?;

        let record = self.resolve_secret(id_or_name).await?;
        let dek_id = record.dek_id;

        let opened = self
            .keys
            .open(&record.data, Some(dek_id))
            .map_err(|e| map_open_error(e, dek_id))?;

        let value = String::from_utf8(opened.plaintext.to_vec())
            .map_err(|_| ApiError::Internal("stored secret is not valid UTF-8".to_string()))?;

        if dek_id != self.keys.ring().default_dek_id() {
            self.rotation.schedule(record.id.clone());
        }

        Ok(self.secret_response(record, value))
    }

    /// PUT /secret/{id} — replace the value; the new ciphertext is sealed
    /// under the current default DEK.
    pub async fn update_secret(
        &self,
        bearer: Option<&str>,
        id: Uuid,
        req: UpdateSecretRequest,
    ) -> Result<SecretResponse, ApiError> {
        self.authenticate(bearer).await?;
        validate_secret_value(&req.value)?;

        let secret_id = SecretId(id);
        self.store
            .get_secret(&secret_id)
            .await
            .map_err(for_entity("secret"))?;

        let (data, dek_id) = self.keys.seal(req.value.as_bytes(), None)?;
        self.store
            .update_secret_data(&secret_id, &data, dek_id)
            .await
            .map_err(for_entity("secret"))?;

        let record = self
            .store
            .get_secret(&secret_id)
            .await
            .map_err(for_entity("secret"))?;
        Ok(self.secret_response(record, req.value))
    }

    /// DELETE /secret/{id}
    pub async fn delete_secret(&self, bearer: Option<&str>, id: Uuid) -> Result<(), ApiError> {
        self.authenticate(bearer).await?;
        self.store
            .delete_secret(&SecretId(id))
            .await
            .map_err(for_entity("secret"))?;
        info!(secret = %id, "deleted secret");
        Ok(())
    }

    /// GET /secret[?folder=<id>]
    pub async fn list_secrets(
        &self,
        bearer: Option<&str>,
        folder: Option<Uuid>,
    ) -> Result<Vec<SecretSummary>, ApiError> {
        self.authenticate(bearer).await?;
        let folder = folder.map(FolderId);
        let records = self.store.list_secrets(folder.as_ref()).await?;
        Ok(records.into_iter().map(SecretSummary::from).collect())
    }

    async fn resolve_secret(&self, id_or_name: &str) -> Result<SecretRecord, ApiError> {
        if let Ok(id) = Uuid::try_parse(id_or_name) {
            match self.store.get_secret(&SecretId(id)).await {
                Ok(record) => return Ok(record),
                Err(StoreError::NotFound) => {} // fall through to name lookup
                Err(e) => return Err(e.into()),
            }
        }
        self.store
            .get_secret_by_name(id_or_name)
            .await
            .map_err(for_entity("secret"))
    }

    fn secret_response(&self, record: SecretRecord, value: String) -> SecretResponse {
        SecretResponse {
            id: record.id.0,
            name: record.name,
            data: value,
            dek_id: record.dek_id,
            folder_id: record.folder_id.map(|f| f.0),
            last_rotation: record.last_rotation,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

//! DEK CRUD and KEK rotation. All operations require role `*`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use sealbox_auth::AccessPolicy;
use sealbox_keyring::RotationReport;
use sealbox_storage::{DekRecord, Store};

use crate::error::{for_entity, ApiError};
use crate::server::SealboxServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDekRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDekRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKekRequest {
    pub new_kek_id: String,
    #[serde(default)]
    pub old_kek_id: Option<String>,
}

/// DEK as returned by the API. The wrapped key stays in the store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DekInfo {
    pub id: u32,
    pub name: String,
    pub kek_id: String,
    pub version: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DekRecord> for DekInfo {
    fn from(d: DekRecord) -> Self {
        Self {
            id: d.id,
            name: d.name,
            kek_id: d.kek_id,
            version: d.version,
            active: d.active,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

fn valid_dek_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 100
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

impl SealboxServer {
    /// POST /dek
    pub async fn create_dek(
        &self,
        bearer: Option<&str>,
        req: CreateDekRequest,
    ) -> Result<DekInfo, ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;

        if !valid_dek_name(&req.name) {
            return Err(ApiError::Validation(
                "DEK name must match [a-z0-9_-]{1,100}".to_string(),
            ));
        }

        let record = self.keys.create_dek(&req.name).await?;
        Ok(record.into())
    }

    /// GET /dek
    pub async fn list_deks(&self, bearer: Option<&str>) -> Result<Vec<DekInfo>, ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;
        let records = self.store.list_deks().await?;
        Ok(records.into_iter().map(DekInfo::from).collect())
    }

    /// GET /dek/{id}
    pub async fn get_dek(&self, bearer: Option<&str>, id: u32) -> Result<DekInfo, ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;
        let record = self.store.get_dek(id).await.map_err(for_entity("DEK"))?;
        Ok(record.into())
    }

    /// PUT /dek/{id} — toggle the active flag. Inactive DEKs still decrypt
    /// existing secrets; they just stop being rotation targets.
    pub async fn update_dek(
        &self,
        bearer: Option<&str>,
        id: u32,
        req: UpdateDekRequest,
    ) -> Result<DekInfo, ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;
        self.store
            .set_dek_active(id, req.active)
            .await
            .map_err(for_entity("DEK"))?;
        let record = self.store.get_dek(id).await.map_err(for_entity("DEK"))?;
        Ok(record.into())
    }

    /// DELETE /dek/{id} — refused while any secret references the DEK;
    /// deleting it would make those secrets unrecoverable.
    pub async fn delete_dek(&self, bearer: Option<&str>, id: u32) -> Result<(), ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;

        self.store.get_dek(id).await.map_err(for_entity("DEK"))?;

        let referencing = self.store.count_secrets_for_dek(id).await?;
        if referencing > 0 {
            return Err(ApiError::Conflict(format!(
                "DEK {id} is referenced by {referencing} secret(s) and cannot be deleted"
            )));
        }

        self.store.delete_dek(id).await.map_err(for_entity("DEK"))?;
        info!(dek = id, "deleted DEK");
        Ok(())
    }

    /// POST /dek/rotate-kek — re-wrap DEKs under a new KEK. Per-row failures
    /// are collected into the report, not raised.
    pub async fn rotate_kek(
        &self,
        bearer: Option<&str>,
        req: RotateKekRequest,
    ) -> Result<RotationReport, ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;

        if req.new_kek_id.is_empty() {
            return Err(ApiError::Validation("newKekId must not be empty".to_string()));
        }

        let report = self
            .keys
            .rotate_kek(&req.new_kek_id, req.old_kek_id.as_deref())
            .await?;
        Ok(report)
    }
}

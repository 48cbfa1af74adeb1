//! Folder tree CRUD. Names are unique per parent; deletion cascades
//! recursively through subfolders and their secrets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use sealbox_storage::{Folder, FolderId, Store};

use crate::error::{for_entity, ApiError};
use crate::server::SealboxServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderInfo {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Folder> for FolderInfo {
    fn from(f: Folder) -> Self {
        Self {
            id: f.id.0,
            name: f.name,
            parent_id: f.parent_id.map(|p| p.0),
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

impl SealboxServer {
    /// POST /folder
    pub async fn create_folder(
        &self,
        bearer: Option<&str>,
        req: CreateFolderRequest,
    ) -> Result<FolderInfo, ApiError> {
        self.authenticate(bearer).await?;

        if req.name.is_empty() || req.name.len() > 100 {
            return Err(ApiError::Validation(
                "folder name must be between 1 and 100 characters".to_string(),
            ));
        }

        let parent_id = match req.parent_id {
            Some(id) => {
                let parent = FolderId(id);
                self.store
                    .get_folder(&parent)
                    .await
                    .map_err(for_entity("parent folder"))?;
                Some(parent)
            }
            None => None,
        };

        let folder = self
            .store
            .create_folder(&req.name, parent_id.as_ref())
            .await
            .map_err(for_entity("folder"))?;

        info!(folder = %folder.id, name = %folder.name, "created folder");
        Ok(folder.into())
    }

    /// GET /folder
    pub async fn list_folders(&self, bearer: Option<&str>) -> Result<Vec<FolderInfo>, ApiError> {
        self.authenticate(bearer).await?;
        let folders = self.store.list_folders().await?;
        Ok(folders.into_iter().map(FolderInfo::from).collect())
    }

    /// GET /folder/{id}
    pub async fn get_folder(&self, bearer: Option<&str>, id: Uuid) -> Result<FolderInfo, ApiError> {
        self.authenticate(bearer).await?;
        let folder = self
            .store
            .get_folder(&FolderId(id))
            .await
            .map_err(for_entity("folder"))?;
        Ok(folder.into())
    }

    /// DELETE /folder/{id} — recursive cascade.
    pub async fn delete_folder(&self, bearer: Option<&str>, id: Uuid) -> Result<(), ApiError> {
        self.authenticate(bearer).await?;
        self.store
            .delete_folder(&FolderId(id))
            .await
            .map_err(for_entity("folder"))?;
        info!(folder = %id, "deleted folder subtree");
        Ok(())
    }
}

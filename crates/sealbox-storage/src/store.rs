//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the service core depends on.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // NOTE: `Option<&'_ T>` parameters below use an explicit lifetime
    // because `mockall::automock` cannot expand elided lifetimes in that
    // position.
    // ───────────────────────────────────── Clients ────────────────────────────────────────

    /// Create a client. Names are unique.
    async fn create_client(&self, params: &NewClient) -> Result<Client, StoreError>;

    async fn get_client(&self, id: &ClientId) -> Result<Client, StoreError>;

    async fn get_client_by_name(&self, name: &str) -> Result<Client, StoreError>;

    /// Stamp `last_used_at` after a successful login.
    async fn touch_client_last_used(&self, id: &ClientId) -> Result<(), StoreError>;

    /// Flip the active flag. Inactive clients cannot authenticate.
    async fn set_client_active(&self, id: &ClientId, active: bool) -> Result<(), StoreError>;

    async fn count_clients(&self) -> Result<u64, StoreError>;

    // ───────────────────────────────────── DEKs ───────────────────────────────────────────

    /// Create a DEK row; the backend assigns the next monotonic id.
    async fn create_dek(&self, params: &NewDek) -> Result<DekRecord, StoreError>;

    async fn get_dek(&self, id: u32) -> Result<DekRecord, StoreError>;

    async fn list_deks(&self) -> Result<Vec<DekRecord>, StoreError>;

    /// Replace a DEK's wrapped form after a KEK rotation. The version is
    /// written verbatim; callers pass the incremented value.
    async fn update_dek_wrapping(
        &self,
        id: u32,
        wrapped_key: &[u8],
        kek_id: &str,
        version: u32,
    ) -> Result<(), StoreError>;

    async fn set_dek_active(&self, id: u32, active: bool) -> Result<(), StoreError>;

    /// Delete a DEK row. Callers must first verify no secret references it.
    async fn delete_dek(&self, id: u32) -> Result<(), StoreError>;

    async fn count_secrets_for_dek(&self, id: u32) -> Result<u64, StoreError>;

    // ───────────────────────────────────── Secrets ────────────────────────────────────────

    /// Create a secret. Names are unique.
    async fn create_secret(&self, params: &NewSecret) -> Result<SecretRecord, StoreError>;

    async fn get_secret(&self, id: &SecretId) -> Result<SecretRecord, StoreError>;

    async fn get_secret_by_name(&self, name: &str) -> Result<SecretRecord, StoreError>;

    async fn list_secrets<'a>(
        &self,
        folder: Option<&'a FolderId>,
    ) -> Result<Vec<SecretRecord>, StoreError>;

    /// Replace a secret's ciphertext (client-driven update).
    async fn update_secret_data(
        &self,
        id: &SecretId,
        data: &[u8],
        dek_id: u32,
    ) -> Result<(), StoreError>;

    /// Replace a secret's ciphertext as part of a DEK rotation, stamping
    /// `last_rotation`. A single row update: it either commits or not.
    async fn mark_secret_rotated(
        &self,
        id: &SecretId,
        data: &[u8],
        dek_id: u32,
    ) -> Result<(), StoreError>;

    async fn delete_secret(&self, id: &SecretId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Folders ────────────────────────────────────────

    /// Create a folder. Names are unique per parent.
    async fn create_folder<'a>(
        &self,
        name: &str,
        parent_id: Option<&'a FolderId>,
    ) -> Result<Folder, StoreError>;

    async fn get_folder(&self, id: &FolderId) -> Result<Folder, StoreError>;

    async fn list_folders(&self) -> Result<Vec<Folder>, StoreError>;

    /// Delete a folder and, recursively, everything under it (subfolders and
    /// their secrets).
    async fn delete_folder(&self, id: &FolderId) -> Result<(), StoreError>;
}

//! Persisted types shared by the service core and storage backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(ClientId);
uuid_id!(SecretId);
uuid_id!(FolderId);

/// An authenticated API client. The secret is stored as an argon2id PHC
/// string and never leaves the store in any other form.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub secret_hash: String,
    pub active: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub secret_hash: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// A data-encryption key row. `wrapped_key` can only be unwrapped by the KMS
/// under `kek_id`; ids are monotonic and start at 1.
#[derive(Debug, Clone)]
pub struct DekRecord {
    pub id: u32,
    pub name: String,
    pub wrapped_key: Vec<u8>,
    pub kek_id: String,
    pub version: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDek {
    pub name: String,
    pub wrapped_key: Vec<u8>,
    pub kek_id: String,
}

/// An encrypted secret row. `data` is an encoded secret package whose header
/// must reference `dek_id`.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    pub id: SecretId,
    pub name: String,
    pub data: Vec<u8>,
    pub dek_id: u32,
    pub folder_id: Option<FolderId>,
    pub last_rotation: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSecret {
    pub name: String,
    pub data: Vec<u8>,
    pub dek_id: u32,
    pub folder_id: Option<FolderId>,
}

/// Folders form a forest; names are unique per parent.
#[derive(Debug, Clone)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub parent_id: Option<FolderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//! SQLite implementation of the sealbox [`Store`] trait.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use sealbox_storage::{
    Client, ClientId, DekRecord, Folder, FolderId, NewClient, NewDek, NewSecret, SecretId,
    SecretRecord, Store, StoreError,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend)?;

        MIGRATOR.run(&pool).await.map_err(backend)?;

        Ok(Self { pool })
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map UNIQUE and FOREIGN KEY violations onto the uniform error kinds.
fn write_error(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else if s.contains("FOREIGN KEY") {
        StoreError::Conflict
    } else {
        StoreError::Backend(s)
    }
}

fn ts(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| backend(format!("bad timestamp {secs}")))
}

fn opt_ts(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    secs.map(ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(backend)
}

fn string_set(json: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(json).map_err(backend)
}

type ClientRow = (
    String,
    String,
    String,
    i64,
    String,
    String,
    i64,
    i64,
    Option<i64>,
);

fn client_from_row(row: ClientRow) -> Result<Client, StoreError> {
    let (id, name, secret_hash, active, roles, permissions, created, updated, last_used) = row;
    Ok(Client {
        id: ClientId(parse_uuid(&id)?),
        name,
        secret_hash,
        active: active != 0,
        roles: string_set(&roles)?,
        permissions: string_set(&permissions)?,
        created_at: ts(created)?,
        updated_at: ts(updated)?,
        last_used_at: opt_ts(last_used)?,
    })
}

const CLIENT_COLUMNS: &str =
    "id,name,secret_hash,active,roles,permissions,created_at,updated_at,last_used_at";

type DekRow = (i64, String, Vec<u8>, String, i64, i64, i64, i64);

fn dek_from_row(row: DekRow) -> Result<DekRecord, StoreError> {
    let (id, name, wrapped_key, kek_id, version, active, created, updated) = row;
    Ok(DekRecord {
        id: id as u32,
        name,
        wrapped_key,
        kek_id,
        version: version as u32,
        active: active != 0,
        created_at: ts(created)?,
        updated_at: ts(updated)?,
    })
}

const DEK_COLUMNS: &str = "id,name,wrapped_key,kek_id,version,active,created_at,updated_at";

type SecretRow = (
    String,
    String,
    Vec<u8>,
    i64,
    Option<String>,
    Option<i64>,
    i64,
    i64,
);

fn secret_from_row(row: SecretRow) -> Result<SecretRecord, StoreError> {
    let (id, name, data, dek_id, folder_id, last_rotation, created, updated) = row;
    Ok(SecretRecord {
        id: SecretId(parse_uuid(&id)?),
        name,
        data,
        dek_id: dek_id as u32,
        folder_id: folder_id.as_deref().map(parse_uuid).transpose()?.map(FolderId),
        last_rotation: opt_ts(last_rotation)?,
        created_at: ts(created)?,
        updated_at: ts(updated)?,
    })
}

const SECRET_COLUMNS: &str =
    "id,name,data,dek_id,folder_id,last_rotation,created_at,updated_at";

type FolderRow = (String, String, Option<String>, i64, i64);

fn folder_from_row(row: FolderRow) -> Result<Folder, StoreError> {
    let (id, name, parent_id, created, updated) = row;
    Ok(Folder {
        id: FolderId(parse_uuid(&id)?),
        name,
        parent_id: parent_id.as_deref().map(parse_uuid).transpose()?.map(FolderId),
        created_at: ts(created)?,
        updated_at: ts(updated)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Clients ─────────────────────────────

    async fn create_client(&self, params: &NewClient) -> Result<Client, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now().timestamp();
        let roles = serde_json::to_string(&params.roles).map_err(backend)?;
        let permissions = serde_json::to_string(&params.permissions).map_err(backend)?;

        sqlx::query(
            "INSERT INTO clients(id,name,secret_hash,active,roles,permissions,created_at,updated_at)
             VALUES(?,?,?,1,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.name)
        .bind(&params.secret_hash)
        .bind(&roles)
        .bind(&permissions)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        self.get_client(&ClientId(id)).await
    }

    async fn get_client(&self, id: &ClientId) -> Result<Client, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id=?"
        ))
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(client_from_row).ok_or(StoreError::NotFound)?
    }

    async fn get_client_by_name(&self, name: &str) -> Result<Client, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE name=?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(client_from_row).ok_or(StoreError::NotFound)?
    }

    async fn touch_client_last_used(&self, id: &ClientId) -> Result<(), StoreError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("UPDATE clients SET last_used_at=?, updated_at=? WHERE id=?")
            .bind(now)
            .bind(now)
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_client_active(&self, id: &ClientId, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE clients SET active=?, updated_at=? WHERE id=?")
            .bind(active as i64)
            .bind(Utc::now().timestamp())
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn count_clients(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }

    // ───────────────────────────── DEKs ────────────────────────────────

    async fn create_dek(&self, params: &NewDek) -> Result<DekRecord, StoreError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO deks(name,wrapped_key,kek_id,version,active,created_at,updated_at)
             VALUES(?,?,?,1,1,?,?)",
        )
        .bind(&params.name)
        .bind(&params.wrapped_key)
        .bind(&params.kek_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        self.get_dek(result.last_insert_rowid() as u32).await
    }

    async fn get_dek(&self, id: u32) -> Result<DekRecord, StoreError> {
        let row =
            sqlx::query_as::<_, DekRow>(&format!("SELECT {DEK_COLUMNS} FROM deks WHERE id=?"))
                .bind(id as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(dek_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_deks(&self) -> Result<Vec<DekRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DekRow>(&format!(
            "SELECT {DEK_COLUMNS} FROM deks ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(dek_from_row).collect()
    }

    async fn update_dek_wrapping(
        &self,
        id: u32,
        wrapped_key: &[u8],
        kek_id: &str,
        version: u32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE deks SET wrapped_key=?, kek_id=?, version=?, updated_at=? WHERE id=?",
        )
        .bind(wrapped_key)
        .bind(kek_id)
        .bind(version as i64)
        .bind(Utc::now().timestamp())
        .bind(id as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_dek_active(&self, id: u32, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE deks SET active=?, updated_at=? WHERE id=?")
            .bind(active as i64)
            .bind(Utc::now().timestamp())
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_dek(&self, id: u32) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM deks WHERE id=?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn count_secrets_for_dek(&self, id: u32) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM secrets WHERE dek_id=?")
            .bind(id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }

    // ───────────────────────────── Secrets ─────────────────────────────

    async fn create_secret(&self, params: &NewSecret) -> Result<SecretRecord, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO secrets(id,name,data,dek_id,folder_id,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.name)
        .bind(&params.data)
        .bind(params.dek_id as i64)
        .bind(params.folder_id.as_ref().map(|f| f.0.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        self.get_secret(&SecretId(id)).await
    }

    async fn get_secret(&self, id: &SecretId) -> Result<SecretRecord, StoreError> {
        let row = sqlx::query_as::<_, SecretRow>(&format!(
            "SELECT {SECRET_COLUMNS} FROM secrets WHERE id=?"
        ))
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(secret_from_row).ok_or(StoreError::NotFound)?
    }

    async fn get_secret_by_name(&self, name: &str) -> Result<SecretRecord, StoreError> {
        let row = sqlx::query_as::<_, SecretRow>(&format!(
            "SELECT {SECRET_COLUMNS} FROM secrets WHERE name=?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(secret_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_secrets<'a>(
        &self,
        folder: Option<&'a FolderId>,
    ) -> Result<Vec<SecretRecord>, StoreError> {
        let rows = match folder {
            Some(folder_id) => {
                sqlx::query_as::<_, SecretRow>(&format!(
                    "SELECT {SECRET_COLUMNS} FROM secrets WHERE folder_id=? ORDER BY name"
                ))
                .bind(folder_id.0.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, SecretRow>(&format!(
                    "SELECT {SECRET_COLUMNS} FROM secrets ORDER BY name"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(backend)?;

        rows.into_iter().map(secret_from_row).collect()
    }

    async fn update_secret_data(
        &self,
        id: &SecretId,
        data: &[u8],
        dek_id: u32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE secrets SET data=?, dek_id=?, updated_at=? WHERE id=?")
            .bind(data)
            .bind(dek_id as i64)
            .bind(Utc::now().timestamp())
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_secret_rotated(
        &self,
        id: &SecretId,
        data: &[u8],
        dek_id: u32,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE secrets SET data=?, dek_id=?, last_rotation=?, updated_at=? WHERE id=?",
        )
        .bind(data)
        .bind(dek_id as i64)
        .bind(now)
        .bind(now)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_secret(&self, id: &SecretId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM secrets WHERE id=?")
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Folders ─────────────────────────────

    async fn create_folder<'a>(
        &self,
        name: &str,
        parent_id: Option<&'a FolderId>,
    ) -> Result<Folder, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now().timestamp();

        sqlx::query("INSERT INTO folders(id,name,parent_id,created_at,updated_at) VALUES(?,?,?,?,?)")
            .bind(id.to_string())
            .bind(name)
            .bind(parent_id.map(|p| p.0.to_string()))
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        self.get_folder(&FolderId(id)).await
    }

    async fn get_folder(&self, id: &FolderId) -> Result<Folder, StoreError> {
        let row = sqlx::query_as::<_, FolderRow>(
            "SELECT id,name,parent_id,created_at,updated_at FROM folders WHERE id=?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(folder_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, StoreError> {
        let rows = sqlx::query_as::<_, FolderRow>(
            "SELECT id,name,parent_id,created_at,updated_at FROM folders ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(folder_from_row).collect()
    }

    async fn delete_folder(&self, id: &FolderId) -> Result<(), StoreError> {
        // Walk the subtree breadth-first, then delete leaves-first so the
        // self-referencing FK never trips.
        let mut subtree = vec![id.0.to_string()];
        let mut frontier = vec![id.0.to_string()];

        while let Some(parent) = frontier.pop() {
            let children: Vec<(String,)> =
                sqlx::query_as("SELECT id FROM folders WHERE parent_id=?")
                    .bind(&parent)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(backend)?;
            for (child,) in children {
                subtree.push(child.clone());
                frontier.push(child);
            }
        }

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM folders WHERE id=?")
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for folder_id in subtree.iter().rev() {
            sqlx::query("DELETE FROM secrets WHERE folder_id=?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            sqlx::query("DELETE FROM folders WHERE id=?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_client(name: &str) -> NewClient {
        NewClient {
            name: name.to_string(),
            secret_hash: "$argon2id$stub".to_string(),
            roles: vec!["reader".to_string()],
            permissions: vec!["secrets:read".to_string()],
        }
    }

    fn new_dek(name: &str) -> NewDek {
        NewDek {
            name: name.to_string(),
            wrapped_key: vec![1, 2, 3],
            kek_id: "kek1".to_string(),
        }
    }

    #[tokio::test]
    async fn client_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let created = store.create_client(&new_client("alice")).await.unwrap();

        assert!(created.active);
        assert_eq!(created.roles, vec!["reader"]);
        assert!(created.last_used_at.is_none());

        let by_name = store.get_client_by_name("alice").await.unwrap();
        assert_eq!(by_name.id, created.id);

        store.touch_client_last_used(&created.id).await.unwrap();
        let touched = store.get_client(&created.id).await.unwrap();
        assert!(touched.last_used_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_client_name_rejected() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create_client(&new_client("alice")).await.unwrap();
        assert!(matches!(
            store.create_client(&new_client("alice")).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn revoked_client_reads_back_inactive() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let client = store.create_client(&new_client("alice")).await.unwrap();
        store.set_client_active(&client.id, false).await.unwrap();
        assert!(!store.get_client(&client.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn dek_ids_are_monotonic_from_one() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let a = store.create_dek(&new_dek("k1")).await.unwrap();
        let b = store.create_dek(&new_dek("k2")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.version, 1);
    }

    #[tokio::test]
    async fn dek_rewrap_updates_row() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let dek = store.create_dek(&new_dek("k1")).await.unwrap();

        store
            .update_dek_wrapping(dek.id, &[9, 9, 9], "kek2", dek.version + 1)
            .await
            .unwrap();

        let reloaded = store.get_dek(dek.id).await.unwrap();
        assert_eq!(reloaded.wrapped_key, vec![9, 9, 9]);
        assert_eq!(reloaded.kek_id, "kek2");
        assert_eq!(reloaded.version, 2);
    }

    #[tokio::test]
    async fn secret_round_trip_and_dek_reference_count() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let dek = store.create_dek(&new_dek("k1")).await.unwrap();

        let secret = store
            .create_secret(&NewSecret {
                name: "db-password".to_string(),
                data: vec![0xde, 0xad],
                dek_id: dek.id,
                folder_id: None,
            })
            .await
            .unwrap();

        assert_eq!(store.count_secrets_for_dek(dek.id).await.unwrap(), 1);
        assert!(secret.last_rotation.is_none());

        store
            .mark_secret_rotated(&secret.id, &[0xbe, 0xef], dek.id)
            .await
            .unwrap();
        let rotated = store.get_secret(&secret.id).await.unwrap();
        assert_eq!(rotated.data, vec![0xbe, 0xef]);
        assert!(rotated.last_rotation.is_some());
    }

    #[tokio::test]
    async fn secret_with_unknown_dek_rejected() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let result = store
            .create_secret(&NewSecret {
                name: "orphan".to_string(),
                data: vec![1],
                dek_id: 42,
                folder_id: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn folder_names_unique_per_parent() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let root = store.create_folder("apps", None).await.unwrap();

        // same name under different parents is fine
        store.create_folder("prod", Some(&root.id)).await.unwrap();
        store.create_folder("prod", None).await.unwrap();

        assert!(matches!(
            store.create_folder("prod", Some(&root.id)).await,
            Err(StoreError::AlreadyExists)
        ));
        assert!(matches!(
            store.create_folder("apps", None).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn folder_delete_cascades_recursively() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let dek = store.create_dek(&new_dek("k1")).await.unwrap();

        let root = store.create_folder("apps", None).await.unwrap();
        let child = store.create_folder("prod", Some(&root.id)).await.unwrap();
        store
            .create_secret(&NewSecret {
                name: "nested".to_string(),
                data: vec![1],
                dek_id: dek.id,
                folder_id: Some(child.id.clone()),
            })
            .await
            .unwrap();

        store.delete_folder(&root.id).await.unwrap();

        assert!(matches!(
            store.get_folder(&child.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_secret_by_name("nested").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_secrets_filters_by_folder() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let dek = store.create_dek(&new_dek("k1")).await.unwrap();
        let folder = store.create_folder("apps", None).await.unwrap();

        for (name, folder_id) in [("a", None), ("b", Some(folder.id.clone()))] {
            store
                .create_secret(&NewSecret {
                    name: name.to_string(),
                    data: vec![1],
                    dek_id: dek.id,
                    folder_id,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.list_secrets(None).await.unwrap().len(), 2);
        let filtered = store.list_secrets(Some(&folder.id)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "b");
    }
}

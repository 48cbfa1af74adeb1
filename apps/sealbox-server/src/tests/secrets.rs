//! Secret CRUD, validation, tamper detection, folders.

use super::common::{admin_token, test_server};
use crate::error::ApiError;
use crate::handlers::folders::CreateFolderRequest;
use crate::handlers::secrets::{CreateSecretRequest, UpdateSecretRequest};
use sealbox_storage::{SecretId, Store};

fn create_req(name: &str, value: &str) -> CreateSecretRequest {
    CreateSecretRequest {
        name: name.to_string(),
        value: value.to_string(),
        folder_id: None,
    }
}

#[tokio::test]
async fn create_and_read_round_trip() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let created = server
        .create_secret(Some(&token), create_req("s1", "hunter2!"))
        .await
        .unwrap();
    assert_eq!(created.name, "s1");
    assert_eq!(created.dek_id, 1);

    // by name
    let by_name = server.get_secret(Some(&token), "s1").await.unwrap();
    assert_eq!(by_name.data, "hunter2!");
    assert_eq!(by_name.dek_id, 1);

    // by id
    let by_id = server
        .get_secret(Some(&token), &created.id.to_string())
        .await
        .unwrap();
    assert_eq!(by_id.data, "hunter2!");
}

#[tokio::test]
async fn stored_data_is_not_plaintext() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let created = server
        .create_secret(Some(&token), create_req("s1", "hunter2!"))
        .await
        .unwrap();

    let row = server
        .store
        .get_secret(&SecretId(created.id))
        .await
        .unwrap();
    assert!(!row
        .data
        .windows(b"hunter2!".len())
        .any(|w| w == b"hunter2!"));
}

#[tokio::test]
async fn name_and_value_validation() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    for (name, value) in [
        ("ab", "long-enough"),     // too short
        ("has space", "long-enough"),
        ("has@sign", "long-enough"),
        ("valid-name", "short"),   // value under 8
    ] {
        let err = server
            .create_secret(Some(&token), create_req(name, value))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)), "{name}/{value}");
    }
}

#[tokio::test]
async fn duplicate_name_conflicts() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    server
        .create_secret(Some(&token), create_req("dup-name", "hunter2!"))
        .await
        .unwrap();
    assert!(matches!(
        server
            .create_secret(Some(&token), create_req("dup-name", "hunter2!"))
            .await
            .unwrap_err(),
        ApiError::Conflict(_)
    ));
}

#[tokio::test]
async fn update_reseals_under_current_default() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let created = server
        .create_secret(Some(&token), create_req("s1", "hunter2!"))
        .await
        .unwrap();

    let updated = server
        .update_secret(
            Some(&token),
            created.id,
            UpdateSecretRequest {
                value: "new-value!".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.data, "new-value!");

    let read = server.get_secret(Some(&token), "s1").await.unwrap();
    assert_eq!(read.data, "new-value!");
}

#[tokio::test]
async fn delete_then_read_is_not_found() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let created = server
        .create_secret(Some(&token), create_req("s1", "hunter2!"))
        .await
        .unwrap();
    server.delete_secret(Some(&token), created.id).await.unwrap();

    assert!(matches!(
        server.get_secret(Some(&token), "s1").await.unwrap_err(),
        ApiError::NotFound(_)
    ));
}

#[tokio::test]
async fn tampered_row_fails_with_authentication_failure() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let created = server
        .create_secret(Some(&token), create_req("s1", "hunter2!"))
        .await
        .unwrap();

    // Flip one byte near the end of the stored package (inside the AEAD
    // payload) and write it back unchanged otherwise.
    let row = server
        .store
        .get_secret(&SecretId(created.id))
        .await
        .unwrap();
    let mut data = row.data.clone();
    let last = data.len() - 1;
    data[last] ^= 0x01;
    server
        .store
        .update_secret_data(&row.id, &data, row.dek_id)
        .await
        .unwrap();

    let err = server.get_secret(Some(&token), "s1").await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::AuthenticationFailure { dek_id: 1 }
    ));
}

#[tokio::test]
async fn secrets_can_live_in_folders() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let folder = server
        .create_folder(
            Some(&token),
            CreateFolderRequest {
                name: "apps".to_string(),
                parent_id: None,
            },
        )
        .await
        .unwrap();

    let mut req = create_req("nested", "hunter2!");
    req.folder_id = Some(folder.id);
    let created = server.create_secret(Some(&token), req).await.unwrap();
    assert_eq!(created.folder_id, Some(folder.id));

    let listed = server
        .list_secrets(Some(&token), Some(folder.id))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "nested");

    // deleting the folder takes the secret with it
    server.delete_folder(Some(&token), folder.id).await.unwrap();
    assert!(matches!(
        server.get_secret(Some(&token), "nested").await.unwrap_err(),
        ApiError::NotFound(_)
    ));
}

#[tokio::test]
async fn unknown_folder_rejected_on_create() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let mut req = create_req("orphan", "hunter2!");
    req.folder_id = Some(uuid::Uuid::now_v7());
    assert!(matches!(
        server.create_secret(Some(&token), req).await.unwrap_err(),
        ApiError::NotFound("folder")
    ));
}

#[tokio::test]
async fn folder_names_unique_per_parent_via_api() {
    let server = test_server().await;
    let token = admin_token(&server).await;

    let root = server
        .create_folder(
            Some(&token),
            CreateFolderRequest {
                name: "apps".to_string(),
                parent_id: None,
            },
        )
        .await
        .unwrap();

    server
        .create_folder(
            Some(&token),
            CreateFolderRequest {
                name: "prod".to_string(),
                parent_id: Some(root.id),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        server
            .create_folder(
                Some(&token),
                CreateFolderRequest {
                    name: "prod".to_string(),
                    parent_id: Some(root.id),
                },
            )
            .await
            .unwrap_err(),
        ApiError::Conflict(_)
    ));
}

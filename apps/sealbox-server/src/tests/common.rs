//! Shared test harness: an in-memory server with a two-KEK development KMS
//! so KEK rotation is exercisable end to end.

use std::sync::Arc;

use sealbox_auth::TokenSigner;
use sealbox_keyring::KeyManager;
use sealbox_kms::LocalKms;
use sealbox_store_sqlite::SqliteStore;

use crate::config::{Config, KmsSettings};
use crate::handlers::clients::{LoginRequest, RegisterClientRequest};
use crate::rotation::RotationQueue;
use crate::server::SealboxServer;

pub const ADMIN_SECRET: &str = "0000";
pub const TEST_SIGNING_KEY: &[u8] = b"sealbox-test-signing-key-32bytes";

pub fn test_config() -> Config {
    Config {
        kms: KmsSettings::Dev { kek: vec![1u8; 32] },
        signing_key: TEST_SIGNING_KEY.to_vec(),
        token_ttl_secs: 3600,
        admin_secret: ADMIN_SECRET.to_string(),
        admin_secret_is_default: true,
    }
}

/// A bootstrapped server over in-memory SQLite: admin client seeded, DEK 1
/// created, rotation workers running. The KMS knows `kek1` (current) and
/// `kek2` so rotation tests have a target.
pub async fn test_server() -> Arc<SealboxServer> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let kms = Arc::new(
        LocalKms::with_keks(
            [
                ("kek1".to_string(), vec![1u8; 32]),
                ("kek2".to_string(), vec![2u8; 32]),
            ],
            "kek1",
        )
        .unwrap(),
    );

    let keys = Arc::new(KeyManager::new(store.clone(), kms));
    keys.load().await.unwrap();

    let tokens = TokenSigner::new(TEST_SIGNING_KEY, 3600);
    let rotation = RotationQueue::start(store.clone(), keys.clone(), 2, 64);

    let server = Arc::new(SealboxServer::new(store, keys, tokens, rotation));
    server.bootstrap(&test_config()).await.unwrap();
    server
}

pub async fn admin_token(server: &SealboxServer) -> String {
    server
        .login(LoginRequest {
            name: "admin".to_string(),
            secret: ADMIN_SECRET.to_string(),
        })
        .await
        .unwrap()
        .token
}

/// Register a client with the given sets and log it in.
pub async fn client_token(
    server: &SealboxServer,
    name: &str,
    roles: &[&str],
    permissions: &[&str],
) -> String {
    let admin = admin_token(server).await;
    server
        .register_client(
            Some(&admin),
            RegisterClientRequest {
                name: name.to_string(),
                secret: "test-secret".to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
            },
        )
        .await
        .unwrap();

    server
        .login(LoginRequest {
            name: name.to_string(),
            secret: "test-secret".to_string(),
        })
        .await
        .unwrap()
        .token
}

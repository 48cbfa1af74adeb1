//! The service core: shared state, the authorization guard, and bootstrap.

use std::sync::Arc;

use tracing::{info, warn};

use sealbox_auth::{AccessPolicy, TokenSigner};
use sealbox_keyring::KeyManager;
use sealbox_storage::{Client, ClientId, NewClient, Store};

use crate::config::Config;
use crate::error::ApiError;
use crate::rotation::RotationQueue;

/// Name of the seeded bootstrap client.
pub const ADMIN_CLIENT_NAME: &str = "admin";

/// Name of the bootstrap DEK created on first start.
pub const BOOTSTRAP_DEK_NAME: &str = "primary";

pub struct SealboxServer {
    pub store: Arc<dyn Store>,
    pub keys: Arc<KeyManager>,
    pub tokens: TokenSigner,
    pub rotation: RotationQueue,
}

impl SealboxServer {
    pub fn new(
        store: Arc<dyn Store>,
        keys: Arc<KeyManager>,
        tokens: TokenSigner,
        rotation: RotationQueue,
    ) -> Self {
        Self {
            store,
            keys,
            tokens,
            rotation,
        }
    }

    /// Parse and verify a bearer token, then load the client it names.
    /// Inactive clients are rejected even while their tokens are unexpired.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Client, ApiError> {
        let token = bearer.ok_or(ApiError::AuthenticationRequired)?;
        let claims = self
            .tokens
            .verify(token)
            .map_err(|_| ApiError::InvalidToken)?;

        let client = self
            .store
            .get_client(&ClientId(claims.sub))
            .await
            .map_err(|_| ApiError::InvalidToken)?;

        if !client.active {
            return Err(ApiError::Inactive);
        }
        Ok(client)
    }

    /// Authenticate, then evaluate the operation's access policy against the
    /// client's stored role and permission sets.
    pub async fn authorize(
        &self,
        bearer: Option<&str>,
        policy: &AccessPolicy,
    ) -> Result<Client, ApiError> {
        let client = self.authenticate(bearer).await?;
        policy
            .check(&client.roles, &client.permissions)
            .map_err(|e| ApiError::Forbidden(e.to_string()))?;
        Ok(client)
    }

    /// First-start seeding. Guarantees at least one DEK exists and, when the
    /// client table is empty, an `admin` client with wildcard role and
    /// permission sets. Must run after the DEK cache is loaded and before
    /// traffic is accepted.
    pub async fn bootstrap(&self, config: &Config) -> Result<(), ApiError> {
        if self.keys.ring().is_empty() {
            let dek = self.keys.create_dek(BOOTSTRAP_DEK_NAME).await?;
            info!(dek = dek.id, "bootstrapped initial DEK");
        }

        if self.store.count_clients().await? == 0 {
            if config.admin_secret_is_default {
                warn!("seeding admin client with the default secret; set SEALBOX_ADMIN_SECRET");
            }
            let secret_hash = sealbox_auth::hash_secret(&config.admin_secret)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            let admin = self
                .store
                .create_client(&NewClient {
                    name: ADMIN_CLIENT_NAME.to_string(),
                    secret_hash,
                    roles: vec!["*".to_string()],
                    permissions: vec!["*".to_string()],
                })
                .await?;
            info!(client = %admin.id, "seeded admin client");
        }

        Ok(())
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}

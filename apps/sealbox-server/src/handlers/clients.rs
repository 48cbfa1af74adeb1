//! Client registration, login, info and revocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use sealbox_auth::AccessPolicy;
use sealbox_storage::{Client, ClientId, NewClient, Store, StoreError};

use crate::error::{for_entity, ApiError};
use crate::server::SealboxServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientRequest {
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub name: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
}

/// Client as returned by the API; the secret hash never leaves the store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<Client> for ClientInfo {
    fn from(c: Client) -> Self {
        Self {
            id: c.id.0,
            name: c.name,
            active: c.active,
            roles: c.roles,
            permissions: c.permissions,
            created_at: c.created_at,
            updated_at: c.updated_at,
            last_used_at: c.last_used_at,
        }
    }
}

impl SealboxServer {
    /// POST /client/register — requires role `*`.
    pub async fn register_client(
        &self,
        bearer: Option<&str>,
        req: RegisterClientRequest,
    ) -> Result<ClientInfo, ApiError> {
        self.authorize(bearer, &AccessPolicy::roles(&["*"])).await?;

        if req.name.is_empty() || req.name.len() > 100 {
            return Err(ApiError::Validation(
                "client name must be between 1 and 100 characters".to_string(),
            ));
        }
        if req.secret.is_empty() {
            return Err(ApiError::Validation("secret must not be empty".to_string()));
        }

        let secret_hash =
            sealbox_auth::hash_secret(&req.secret).map_err(|e| ApiError::Internal(e.to_string()))?;

        let client = self
            .store
            .create_client(&NewClient {
                name: req.name,
                secret_hash,
                roles: req.roles,
                permissions: req.permissions,
            })
            .await
            .map_err(for_entity("client"))?;

        info!(client = %client.id, name = %client.name, "registered client");
        Ok(client.into())
    }

    /// POST /client/login — public. The failure answer is uniform: it never
    /// reveals whether the name exists, the secret was wrong, or the client
    /// was deactivated.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ApiError> {
        let client = match self.store.get_client_by_name(&req.name).await {
            Ok(client) => client,
            Err(StoreError::NotFound) => return Err(ApiError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        if !client.active || !sealbox_auth::verify_secret(&req.secret, &client.secret_hash) {
            return Err(ApiError::InvalidCredentials);
        }

        self.store.touch_client_last_used(&client.id).await?;

        let token = self
            .tokens
            .issue(client.id.0, client.roles, client.permissions)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(LoginResponse {
            token,
            expires_in: self.tokens.lifetime_secs(),
        })
    }

    /// GET /client/info/{id} — any valid token.
    pub async fn client_info(
        &self,
        bearer: Option<&str>,
        id: Uuid,
    ) -> Result<ClientInfo, ApiError> {
        self.authenticate(bearer).await?;
        let client = self
            .store
            .get_client(&ClientId(id))
            .await
            .map_err(for_entity("client"))?;
        Ok(client.into())
    }

    /// DELETE /client/{id}/revoke — deactivates the client; outstanding
    /// tokens die at the inactive check.
    pub async fn revoke_client(&self, bearer: Option<&str>, id: Uuid) -> Result<(), ApiError> {
        self.authenticate(bearer).await?;
        self.store
            .set_client_active(&ClientId(id), false)
            .await
            .map_err(for_entity("client"))?;
        info!(client = %id, "revoked client");
        Ok(())
    }
}

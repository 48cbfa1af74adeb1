//! API error taxonomy.
//!
//! Every handler returns `Result<_, ApiError>`; mapping to an HTTP status
//! happens exactly once, at the axum boundary. Internal details are
//! redacted from responses and logged instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use sealbox_keyring::KeyringError;
use sealbox_kms::KmsError;
use sealbox_storage::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    AuthenticationRequired,
    /// Uniform message: never discloses whether the name or the secret was
    /// wrong, or whether the client exists at all.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("client is inactive")]
    Inactive,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    /// The stored package failed AEAD authentication: tampering or a
    /// key/data integrity fault. Never retried; no plaintext involved.
    #[error("decryption failed for DEK {dek_id}")]
    AuthenticationFailure { dek_id: u32 },
    #[error("KMS payload integrity check failed")]
    TransportCorruption,
    #[error("KMS call timed out")]
    TransportTimeout,
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationFailure",
            ApiError::AuthenticationRequired => "AuthenticationRequired",
            ApiError::InvalidCredentials => "InvalidCredentials",
            ApiError::InvalidToken => "InvalidOrExpired",
            ApiError::Inactive => "Inactive",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::AuthenticationFailure { .. } => "AuthenticationFailure",
            ApiError::TransportCorruption => "TransportCorruption",
            ApiError::TransportTimeout => "TransportTimeout",
            ApiError::Internal(_) => "Internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationRequired
            | ApiError::InvalidCredentials
            | ApiError::InvalidToken
            | ApiError::Inactive => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::AuthenticationFailure { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::TransportCorruption => StatusCode::BAD_GATEWAY,
            ApiError::TransportTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal detail stays in the logs, not the response body.
        let message = match &self {
            ApiError::Internal(detail) => {
                error!(detail, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        for_entity("resource")(e)
    }
}

impl From<KmsError> for ApiError {
    fn from(e: KmsError) -> Self {
        match e {
            KmsError::TransportCorruption => ApiError::TransportCorruption,
            KmsError::TransportTimeout => ApiError::TransportTimeout,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<KeyringError> for ApiError {
    fn from(e: KeyringError) -> Self {
        match e {
            KeyringError::Kms(kms) => kms.into(),
            KeyringError::Store(store) => store.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Map a store error for one entity, giving NotFound/Conflict a proper noun.
pub fn for_entity(entity: &'static str) -> impl Fn(StoreError) -> ApiError {
    move |e| match e {
        StoreError::NotFound => ApiError::NotFound(entity),
        StoreError::AlreadyExists => ApiError::Conflict(format!("{entity} already exists")),
        StoreError::Conflict => ApiError::Conflict(format!("{entity} is referenced")),
        StoreError::Backend(detail) => ApiError::Internal(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("secret").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("secret already exists".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::AuthenticationFailure { dek_id: 1 }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::TransportCorruption.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::TransportTimeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn kms_errors_map_to_gateway_statuses() {
        let e: ApiError = KmsError::TransportCorruption.into();
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        let e: ApiError = KmsError::TransportTimeout.into();
        assert_eq!(e.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}

//! Signed bearer tokens.
//!
//! Compact HS256 tokens carrying the client id, its role and permission
//! sets, and issue/expiry timestamps. The signing key is process-held and
//! comes from configuration.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token")]
    Sign(jsonwebtoken::errors::Error),
    /// Bad signature, unknown algorithm, missing or elapsed expiry, or an
    /// otherwise malformed token. Collapsed to one variant so the API
    /// answer is uniform.
    #[error("invalid or expired token")]
    Invalid,
}

/// Claims carried by a sealbox token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Client id.
    pub sub: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenSigner {
    /// `lifetime_secs` defaults to an hour at the configuration layer.
    pub fn new(signing_key: &[u8], lifetime_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            lifetime: Duration::seconds(lifetime_secs),
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }

    pub fn issue(
        &self,
        client_id: Uuid,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: client_id,
            roles,
            permissions,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Sign)
    }

    /// Verify signature and expiry. Rejects any algorithm other than HS256
    /// and any token without an `exp` claim.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

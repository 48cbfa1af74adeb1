//! KEK wrap/unwrap adapter.
//!
//! Two implementations behind one trait, selected at construction time:
//! [`RemoteKms`] talks to an external key-management service and checks
//! CRC32C integrity on every payload in both directions; [`LocalKms`] holds
//! named 32-byte KEKs in memory and wraps with the AEAD primitive directly
//! (development mode).

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

mod local;
mod remote;

pub use local::LocalKms;
pub use remote::{RemoteKms, RemoteKmsConfig};

#[derive(Debug, Error)]
pub enum KmsError {
    #[error("unknown KEK {0:?}")]
    UnknownKek(String),
    /// A payload CRC did not match on either side of the wire. Fatal to the
    /// operation; never retried by this layer.
    #[error("KMS payload integrity check failed")]
    TransportCorruption,
    #[error("KMS call timed out")]
    TransportTimeout,
    #[error("KMS transport error: {0}")]
    Transport(String),
    #[error("KMS rejected the request with status {0}")]
    Rejected(u16),
    #[error("KMS response missing field {0:?}")]
    MalformedResponse(&'static str),
    #[error("KEK wrap failed")]
    WrapFailed,
    #[error("KEK unwrap failed")]
    UnwrapFailed,
    #[error("invalid KEK material: {0}")]
    InvalidKey(String),
}

/// Wraps and unwraps data-encryption keys under a named KEK.
///
/// `current_kek` is the id new DEKs get wrapped under; KEK rotation repoints
/// it once a rotation batch has finished.
#[async_trait]
pub trait KmsAdapter: Send + Sync {
    fn current_kek(&self) -> String;

    fn set_current_kek(&self, kek_id: &str) -> Result<(), KmsError>;

    async fn wrap_dek(&self, plaintext_key: &[u8], kek_id: &str) -> Result<Vec<u8>, KmsError>;

    async fn unwrap_dek(
        &self,
        wrapped: &[u8],
        kek_id: &str,
    ) -> Result<Zeroizing<Vec<u8>>, KmsError>;

    /// Move a wrapped DEK from one KEK to another without exposing it to
    /// callers.
    async fn reencrypt_dek(
        &self,
        wrapped: &[u8],
        old_kek_id: &str,
        new_kek_id: &str,
    ) -> Result<Vec<u8>, KmsError> {
        let plaintext = self.unwrap_dek(wrapped, old_kek_id).await?;
        self.wrap_dek(&plaintext, new_kek_id).await
    }
}

//! Development-mode KMS: locally-held KEKs, AEAD wrap/unwrap.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sealbox_crypto::{Dek, KEY_SIZE};
use zeroize::Zeroizing;

use crate::{KmsAdapter, KmsError};

/// Holds one or more named 32-byte KEKs in memory. The wrapped form is
/// header-less: the KEK identity lives in configuration, not in the blob.
pub struct LocalKms {
    keks: HashMap<String, Dek>,
    current: RwLock<String>,
}

impl LocalKms {
    /// Single-KEK setup, the usual dev configuration.
    pub fn new(kek_id: impl Into<String>, kek: &[u8]) -> Result<Self, KmsError> {
        let kek_id = kek_id.into();
        let mut keks = HashMap::new();
        keks.insert(kek_id.clone(), parse_kek(kek)?);
        Ok(Self {
            keks,
            current: RwLock::new(kek_id),
        })
    }

    /// Multi-KEK setup, used to exercise KEK rotation without a remote KMS.
    pub fn with_keks(
        keks: impl IntoIterator<Item = (String, Vec<u8>)>,
        current: impl Into<String>,
    ) -> Result<Self, KmsError> {
        let current = current.into();
        let mut parsed = HashMap::new();
        for (id, bytes) in keks {
            parsed.insert(id, parse_kek(&bytes)?);
        }
        if !parsed.contains_key(&current) {
            return Err(KmsError::UnknownKek(current));
        }
        Ok(Self {
            keks: parsed,
            current: RwLock::new(current),
        })
    }

    fn kek(&self, kek_id: &str) -> Result<&Dek, KmsError> {
        self.keks
            .get(kek_id)
            .ok_or_else(|| KmsError::UnknownKek(kek_id.to_string()))
    }
}

fn parse_kek(bytes: &[u8]) -> Result<Dek, KmsError> {
    if bytes.len() != KEY_SIZE {
        return Err(KmsError::InvalidKey(format!(
            "expected {KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    Dek::from_bytes(bytes).map_err(|e| KmsError::InvalidKey(e.to_string()))
}

#[async_trait]
impl KmsAdapter for LocalKms {
    fn current_kek(&self) -> String {
        self.current.read().clone()
    }

    fn set_current_kek(&self, kek_id: &str) -> Result<(), KmsError> {
        if !self.keks.contains_key(kek_id) {
            return Err(KmsError::UnknownKek(kek_id.to_string()));
        }
        *self.current.write() = kek_id.to_string();
        Ok(())
    }

    async fn wrap_dek(&self, plaintext_key: &[u8], kek_id: &str) -> Result<Vec<u8>, KmsError> {
        let kek = self.kek(kek_id)?;
        sealbox_crypto::encrypt(plaintext_key, kek, b"").map_err(|_| KmsError::WrapFailed)
    }

    async fn unwrap_dek(
        &self,
        wrapped: &[u8],
        kek_id: &str,
    ) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        let kek = self.kek(kek_id)?;
        sealbox_crypto::decrypt(wrapped, kek, b"").map_err(|_| KmsError::UnwrapFailed)
    }
}

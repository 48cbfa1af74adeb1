//! DEK cache and rotation engine.
//!
//! [`KeyRing`] is the in-memory catalogue of unwrapped, ready-to-use DEKs
//! plus the pointer to the current default (the DEK new and re-encrypted
//! secrets are sealed under). [`KeyManager`] orchestrates the lifecycle:
//! startup load, DEK creation, and KEK rotation.
//!
//! Invariant: a DEK id observed from the default pointer is resolvable in
//! the cache at that instant. Writers insert into the cache before they
//! repoint the default.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use sealbox_crypto::Dek;
use sealbox_envelope::{EnvelopeError, Opened};
use sealbox_kms::{KmsAdapter, KmsError};
use sealbox_storage::{DekRecord, NewDek, Store, StoreError};

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("DEK {0} is not in the cache")]
    UnknownDek(u32),
    #[error("DEK {id} unwrapped to invalid key material")]
    InvalidKeyMaterial { id: u32 },
    #[error(transparent)]
    Kms(#[from] KmsError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// In-memory DEK catalogue. Readers dominate; writers are startup load,
/// DEK creation and the KEK rotation loop.
pub struct KeyRing {
    deks: RwLock<HashMap<u32, Dek>>,
    default_dek: AtomicU32,
}

impl KeyRing {
    fn new() -> Self {
        Self {
            deks: RwLock::new(HashMap::new()),
            default_dek: AtomicU32::new(1),
        }
    }

    pub fn get(&self, id: u32) -> Option<Dek> {
        self.deks.read().get(&id).cloned()
    }

    pub fn insert(&self, id: u32, dek: Dek) {
        self.deks.write().insert(id, dek);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.deks.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.deks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deks.read().is_empty()
    }

    pub fn default_dek_id(&self) -> u32 {
        self.default_dek.load(Ordering::Acquire)
    }

    fn set_default(&self, id: u32) {
        self.default_dek.store(id, Ordering::Release);
    }
}

/// Outcome of a KEK rotation batch. Failures do not abort the batch; each
/// DEK is independent.
#[derive(Debug, Serialize)]
pub struct RotationReport {
    pub total: usize,
    pub success: usize,
    pub failures: Vec<RotationFailure>,
}

#[derive(Debug, Serialize)]
pub struct RotationFailure {
    pub id: u32,
    pub error: String,
}

/// Owns the DEK cache and drives the DEK lifecycle against the store and
/// the KMS adapter.
pub struct KeyManager {
    store: Arc<dyn Store>,
    kms: Arc<dyn KmsAdapter>,
    ring: KeyRing,
}

impl KeyManager {
    pub fn new(store: Arc<dyn Store>, kms: Arc<dyn KmsAdapter>) -> Self {
        Self {
            store,
            kms,
            ring: KeyRing::new(),
        }
    }

    pub fn ring(&self) -> &KeyRing {
        &self.ring
    }

    pub fn kms(&self) -> &dyn KmsAdapter {
        self.kms.as_ref()
    }

    /// Startup load: unwrap every DEK row and populate the cache, then point
    /// the default at the highest id seen (1 when the table is empty, for
    /// the bootstrap DEK about to be created). Any unwrap failure is fatal;
    /// the service must not start partially usable.
    pub async fn load(&self) -> Result<usize, KeyringError> {
        let records = self.store.list_deks().await?;

        for record in &records {
            let dek = self.unwrap_record(record).await?;
            self.ring.insert(record.id, dek);
        }

        let default = records.iter().map(|r| r.id).max().unwrap_or(1);
        self.ring.set_default(default);

        info!(deks = records.len(), default, "DEK cache populated");
        Ok(records.len())
    }

    async fn unwrap_record(&self, record: &DekRecord) -> Result<Dek, KeyringError> {
        let plaintext = self
            .kms
            .unwrap_dek(&record.wrapped_key, &record.kek_id)
            .await?;
        Dek::from_bytes(&plaintext).map_err(|_| KeyringError::InvalidKeyMaterial { id: record.id })
    }

    /// Create a DEK: fresh random key, wrapped under the current KEK,
    /// persisted, imported, and made the default for new secrets. The
    /// plaintext key is never persisted.
    pub async fn create_dek(&self, name: &str) -> Result<DekRecord, KeyringError> {
        let dek = sealbox_crypto::generate_key();
        let kek_id = self.kms.current_kek();
        let wrapped = self.kms.wrap_dek(dek.as_bytes(), &kek_id).await?;

        let record = self
            .store
            .create_dek(&NewDek {
                name: name.to_string(),
                wrapped_key: wrapped,
                kek_id,
            })
            .await?;

        self.ring.insert(record.id, dek);
        self.ring.set_default(record.id);

        info!(dek = record.id, name = %record.name, "created DEK");
        Ok(record)
    }

    /// Re-wrap every DEK under `new_kek_id`. Rows already wrapped under the
    /// target are counted as successes without touching them, which makes a
    /// retry of the same rotation a no-op at row granularity. The in-memory
    /// key bytes never change; only the wrapped form at rest does.
    pub async fn rotate_kek(
        &self,
        new_kek_id: &str,
        old_kek_id: Option<&str>,
    ) -> Result<RotationReport, KeyringError> {
        let records = self.store.list_deks().await?;

        let mut report = RotationReport {
            total: 0,
            success: 0,
            failures: Vec::new(),
        };

        for record in records {
            if let Some(old) = old_kek_id {
                if record.kek_id != old && record.kek_id != new_kek_id {
                    continue;
                }
            }
            report.total += 1;

            if record.kek_id == new_kek_id {
                report.success += 1;
                continue;
            }

            match self.rewrap(&record, new_kek_id).await {
                Ok(()) => report.success += 1,
                Err(e) => {
                    warn!(dek = record.id, error = %e, "DEK re-wrap failed");
                    report.failures.push(RotationFailure {
                        id: record.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        // New DEKs are wrapped under the new KEK from here on.
        if let Err(e) = self.kms.set_current_kek(new_kek_id) {
            warn!(kek = new_kek_id, error = %e, "failed to repoint current KEK");
        }

        info!(
            total = report.total,
            success = report.success,
            failed = report.failures.len(),
            kek = new_kek_id,
            "KEK rotation finished"
        );
        Ok(report)
    }

    async fn rewrap(&self, record: &DekRecord, new_kek_id: &str) -> Result<(), KeyringError> {
        let plaintext = self
            .kms
            .unwrap_dek(&record.wrapped_key, &record.kek_id)
            .await?;
        let rewrapped = self.kms.wrap_dek(&plaintext, new_kek_id).await?;

        self.store
            .update_dek_wrapping(record.id, &rewrapped, new_kek_id, record.version + 1)
            .await?;

        // Refresh the cache entry; the key bytes are unchanged.
        let dek = Dek::from_bytes(&plaintext)
            .map_err(|_| KeyringError::InvalidKeyMaterial { id: record.id })?;
        self.ring.insert(record.id, dek);
        Ok(())
    }

    /// Seal a plaintext under a specific DEK, or the current default.
    /// Returns the encoded package and the DEK id used.
    pub fn seal(
        &self,
        plaintext: &[u8],
        dek_id: Option<u32>,
    ) -> Result<(Vec<u8>, u32), KeyringError> {
        let id = dek_id.unwrap_or_else(|| self.ring.default_dek_id());
        let dek = self.ring.get(id).ok_or(KeyringError::UnknownDek(id))?;
        let bytes = sealbox_envelope::seal(plaintext, id, &dek)?;
        Ok((bytes, id))
    }

    /// Open an encoded package, resolving the DEK from the cache via the
    /// package header. `expected_dek_id` guards against a row whose column
    /// disagrees with the envelope.
    pub fn open(&self, bytes: &[u8], expected_dek_id: Option<u32>) -> Result<Opened, KeyringError> {
        let package = sealbox_envelope::decode(bytes)?;
        sealbox_envelope::check_header(&package.header, expected_dek_id)?;
        let dek = self
            .ring
            .get(package.header.dek_id)
            .ok_or(KeyringError::UnknownDek(package.header.dek_id))?;
        Ok(sealbox_envelope::open_decoded(&package, &dek)?)
    }
}

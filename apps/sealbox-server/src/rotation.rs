//! Opportunistic per-secret DEK rotation.
//!
//! When a read observes a secret sealed under a non-default DEK, the secret
//! id is queued here and a small worker pool re-encrypts it under the
//! current default. The read path never blocks: enqueue is `try_send`, a
//! full queue drops the id (the next read re-triggers), and a mutex-guarded
//! in-flight set coalesces concurrent triggers for the same secret.
//! Per-item failures are logged and not retried.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sealbox_keyring::{KeyManager, KeyringError};
use sealbox_storage::{SecretId, Store, StoreError};

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

#[derive(Clone)]
pub struct RotationQueue {
    tx: mpsc::Sender<SecretId>,
    in_flight: Arc<Mutex<HashSet<SecretId>>>,
}

impl RotationQueue {
    /// Spawn `workers` consumers over a queue of `depth` entries.
    pub fn start(
        store: Arc<dyn Store>,
        keys: Arc<KeyManager>,
        workers: usize,
        depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<SecretId>(depth);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let store = Arc::clone(&store);
            let keys = Arc::clone(&keys);
            let in_flight = Arc::clone(&in_flight);

            tokio::spawn(async move {
                loop {
                    let id = { rx.lock().await.recv().await };
                    let Some(id) = id else { break };

                    match rotate_secret(store.as_ref(), &keys, &id).await {
                        Ok(true) => info!(secret = %id, "re-encrypted under default DEK"),
                        Ok(false) => {}
                        // Swallow and log; the next read re-triggers.
                        Err(e) => warn!(secret = %id, error = %e, "opportunistic rotation failed"),
                    }
                    in_flight.lock().remove(&id);
                }
            });
        }

        Self { tx, in_flight }
    }

    /// Queue a secret for re-encryption. Never blocks and never fails the
    /// caller; duplicate triggers for an in-flight secret are coalesced.
    pub fn schedule(&self, id: SecretId) {
        {
            let mut guard = self.in_flight.lock();
            if !guard.insert(id.clone()) {
                return;
            }
        }
        if self.tx.try_send(id.clone()).is_err() {
            self.in_flight.lock().remove(&id);
            debug!(secret = %id, "rotation queue full, dropping trigger");
        }
    }
}

/// Re-encrypt one secret under the current default DEK. Returns `false`
/// when the secret already uses the default (another trigger won the race)
/// or has been deleted since it was queued.
pub async fn rotate_secret(
    store: &dyn Store,
    keys: &KeyManager,
    id: &SecretId,
) -> Result<bool, RotationError> {
    let secret = match store.get_secret(id).await {
        Ok(secret) => secret,
        Err(StoreError::NotFound) => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let default = keys.ring().default_dek_id();
    if secret.dek_id == default {
        return Ok(false);
    }

    let opened = keys.open(&secret.data, Some(secret.dek_id))?;
    let (sealed, new_dek_id) = keys.seal(&opened.plaintext, None)?;
    store.mark_secret_rotated(id, &sealed, new_dek_id).await?;

    Ok(true)
}

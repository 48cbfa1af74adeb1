//! Production KMS client.
//!
//! Speaks the encrypt/decrypt surface of an external KMS over JSON, keyed by
//! `projects/{project}/locations/{location}/keyRings/{key_ring}/cryptoKeys/{kek}`.
//! Every payload travels with a CRC32C; a mismatch on either side is
//! [`KmsError::TransportCorruption`] and is never retried here.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{KmsAdapter, KmsError};

#[derive(Debug, Clone)]
pub struct RemoteKmsConfig {
    /// Base URL of the KMS endpoint, e.g. `https://kms.example.com`.
    pub endpoint: String,
    pub project: String,
    pub location: String,
    pub key_ring: String,
    /// Name of the KEK new DEKs are wrapped under.
    pub key: String,
    /// Per-call timeout. Timeouts surface as [`KmsError::TransportTimeout`];
    /// retries are a caller concern.
    pub timeout: Duration,
}

pub struct RemoteKms {
    config: RemoteKmsConfig,
    current: RwLock<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptRequest {
    plaintext: String,
    plaintext_crc32c: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    ciphertext: String,
    ciphertext_crc32c: Option<String>,
    #[serde(default)]
    verified_plaintext_crc32c: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest {
    ciphertext: String,
    ciphertext_crc32c: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptResponse {
    plaintext: String,
    plaintext_crc32c: Option<String>,
}

impl RemoteKms {
    pub fn new(config: RemoteKmsConfig) -> Result<Self, KmsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KmsError::Transport(e.to_string()))?;
        let current = RwLock::new(config.key.clone());
        Ok(Self {
            config,
            current,
            client,
        })
    }

    /// Full resource path of a KEK on this adapter's key ring.
    pub fn key_path(&self, kek_id: &str) -> String {
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.config.project, self.config.location, self.config.key_ring, kek_id
        )
    }

    fn action_url(&self, kek_id: &str, action: &str) -> String {
        format!(
            "{}/v1/{}:{}",
            self.config.endpoint.trim_end_matches('/'),
            self.key_path(kek_id),
            action
        )
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &Req,
    ) -> Result<Resp, KmsError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KmsError::Rejected(status.as_u16()));
        }

        response.json().await.map_err(map_transport_error)
    }
}

fn map_transport_error(e: reqwest::Error) -> KmsError {
    if e.is_timeout() {
        KmsError::TransportTimeout
    } else {
        KmsError::Transport(e.to_string())
    }
}

/// CRC32C of a payload, in the decimal-string form the wire format uses.
fn crc_string(payload: &[u8]) -> String {
    crc32c::crc32c(payload).to_string()
}

/// Verify a received payload against the CRC the peer sent with it.
fn check_crc(payload: &[u8], claimed: Option<&str>, field: &'static str) -> Result<(), KmsError> {
    let claimed = claimed.ok_or(KmsError::MalformedResponse(field))?;
    let computed = crc_string(payload);
    if claimed != computed {
        return Err(KmsError::TransportCorruption);
    }
    Ok(())
}

#[async_trait]
impl KmsAdapter for RemoteKms {
    fn current_kek(&self) -> String {
        self.current.read().clone()
    }

    fn set_current_kek(&self, kek_id: &str) -> Result<(), KmsError> {
        *self.current.write() = kek_id.to_string();
        Ok(())
    }

    async fn wrap_dek(&self, plaintext_key: &[u8], kek_id: &str) -> Result<Vec<u8>, KmsError> {
        let url = self.action_url(kek_id, "encrypt");
        let request = EncryptRequest {
            plaintext: BASE64.encode(plaintext_key),
            plaintext_crc32c: crc_string(plaintext_key),
        };

        let response: EncryptResponse = self.post(&url, &request).await?;

        // The peer must confirm it saw our plaintext intact, and the
        // ciphertext must survive the trip back.
        if !response.verified_plaintext_crc32c {
            return Err(KmsError::TransportCorruption);
        }
        let ciphertext = BASE64
            .decode(&response.ciphertext)
            .map_err(|_| KmsError::MalformedResponse("ciphertext"))?;
        check_crc(
            &ciphertext,
            response.ciphertext_crc32c.as_deref(),
            "ciphertextCrc32c",
        )?;

        debug!(kek = kek_id, "wrapped DEK");
        Ok(ciphertext)
    }

    async fn unwrap_dek(
        &self,
        wrapped: &[u8],
        kek_id: &str,
    ) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        let url = self.action_url(kek_id, "decrypt");
        let request = DecryptRequest {
            ciphertext: BASE64.encode(wrapped),
            ciphertext_crc32c: crc_string(wrapped),
        };

        let response: DecryptResponse = self.post(&url, &request).await?;

        let plaintext = Zeroizing::new(
            BASE64
                .decode(&response.plaintext)
                .map_err(|_| KmsError::MalformedResponse("plaintext"))?,
        );
        check_crc(
            &plaintext,
            response.plaintext_crc32c.as_deref(),
            "plaintextCrc32c",
        )?;

        Ok(plaintext)
    }
}

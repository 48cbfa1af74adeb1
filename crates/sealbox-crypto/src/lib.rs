//! AEAD primitive for sealbox.
//!
//! Single live suite: AES-256-GCM. Sealed bytes are laid out as
//! `nonce(12) || ciphertext || tag(16)` so a sealed buffer is always at
//! least 28 bytes.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Algorithm identifier recorded in envelope headers.
pub const ALGORITHM: &str = "AES-256-GCM";

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// A 256-bit data encryption key. Zeroized on drop; never printed.
#[derive(Clone, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct Dek(Zeroizing<[u8; KEY_SIZE]>);

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key must be exactly {KEY_SIZE} bytes, got {0}")]
    InvalidLength(usize),
}

impl Dek {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(Zeroizing::new(arr)))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Dek([redacted])")
    }
}

/// Generate a fresh random 256-bit key from the OS CSPRNG.
pub fn generate_key() -> Dek {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());
    Dek(key)
}

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("AEAD encryption failed")]
    AeadFailed,
}

#[derive(Debug, Error)]
pub enum DecryptError {
    /// Tag verification failed: the ciphertext, nonce, key or AAD is wrong.
    #[error("AEAD authentication failed")]
    AuthenticationFailed,
    /// Sealed buffer too short to contain a nonce and a tag.
    #[error("malformed ciphertext: {0} bytes, need at least {min}", min = NONCE_SIZE + TAG_SIZE)]
    MalformedCiphertext(usize),
}

/// AEAD encrypt. A fresh nonce is drawn from the OS CSPRNG on every call;
/// `aad` is authenticated but not encrypted.
pub fn encrypt(plaintext: &[u8], key: &Dek, aad: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptError::AeadFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// AEAD decrypt of a `nonce || ciphertext || tag` buffer produced by
/// [`encrypt`]. The same `aad` must be supplied or authentication fails.
pub fn decrypt(sealed: &[u8], key: &Dek, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(DecryptError::MalformedCiphertext(sealed.len()));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| DecryptError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}

//! Encrypted-package codec.
//!
//! A secret at rest is a bincode-encoded [`SecretPackage`]: a small header
//! naming the suite, the layout version and the DEK that sealed the payload,
//! followed by the AEAD output. The encoded header doubles as the AEAD
//! associated data, so the header cannot be swapped without failing
//! authentication. bincode is length-prefixed and deterministic for a fixed
//! struct layout, which is what lets decrypt re-derive the exact AAD bytes.

use sealbox_crypto::{Dek, ALGORITHM};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Current package layout version. Decoders reject anything newer.
pub const PACKAGE_VERSION: u32 = 1;

/// Package header: everything needed to find the right key and suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHeader {
    pub alg: String,
    pub version: u32,
    pub dek_id: u32,
}

impl PackageHeader {
    pub fn new(dek_id: u32) -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            version: PACKAGE_VERSION,
            dek_id,
        }
    }
}

/// The on-disk form: header plus sealed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPackage {
    pub header: PackageHeader,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode package")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode package")]
    Decode(#[source] bincode::Error),
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported package version {0} (max {PACKAGE_VERSION})")]
    UnsupportedVersion(u32),
    #[error("package sealed with DEK {found} but row references DEK {expected}")]
    DekMismatch { expected: u32, found: u32 },
    #[error(transparent)]
    Encrypt(#[from] sealbox_crypto::EncryptError),
    #[error(transparent)]
    Decrypt(#[from] sealbox_crypto::DecryptError),
}

/// Serialize a header to its canonical bytes (the AAD).
pub fn header_bytes(header: &PackageHeader) -> Result<Vec<u8>, EnvelopeError> {
    bincode::serialize(header).map_err(EnvelopeError::Encode)
}

/// Decode a package without opening it. Useful for inspecting the header.
pub fn decode(bytes: &[u8]) -> Result<SecretPackage, EnvelopeError> {
    bincode::deserialize(bytes).map_err(EnvelopeError::Decode)
}

/// Encode a package to its stored form.
pub fn encode(package: &SecretPackage) -> Result<Vec<u8>, EnvelopeError> {
    bincode::serialize(package).map_err(EnvelopeError::Encode)
}

/// Seal `plaintext` under `dek`, stamping `dek_id` into the header.
/// The header bytes are bound as AAD.
pub fn seal(plaintext: &[u8], dek_id: u32, dek: &Dek) -> Result<Vec<u8>, EnvelopeError> {
    let header = PackageHeader::new(dek_id);
    let aad = header_bytes(&header)?;
    let payload = sealbox_crypto::encrypt(plaintext, dek, &aad)?;
    encode(&SecretPackage { header, payload })
}

/// Result of opening a package: the plaintext and the header that sealed it,
/// so callers can observe which DEK was used.
#[derive(Debug)]
pub struct Opened {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub header: PackageHeader,
}

/// Validate a decoded header against the suite, the version ceiling and an
/// optional expected DEK id (a mismatch with the row's column is a
/// data-integrity fault).
pub fn check_header(
    header: &PackageHeader,
    expected_dek_id: Option<u32>,
) -> Result<(), EnvelopeError> {
    if header.alg != ALGORITHM {
        return Err(EnvelopeError::UnsupportedAlgorithm(header.alg.clone()));
    }
    if header.version > PACKAGE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(header.version));
    }
    if let Some(expected) = expected_dek_id {
        if expected != header.dek_id {
            return Err(EnvelopeError::DekMismatch {
                expected,
                found: header.dek_id,
            });
        }
    }
    Ok(())
}

/// Open an already-decoded package with the resolved DEK. The AAD is
/// re-derived from the header; callers must run [`check_header`] first to
/// resolve the key.
pub fn open_decoded(package: &SecretPackage, dek: &Dek) -> Result<Opened, EnvelopeError> {
    let aad = header_bytes(&package.header)?;
    let plaintext = sealbox_crypto::decrypt(&package.payload, dek, &aad)?;
    Ok(Opened {
        plaintext,
        header: package.header.clone(),
    })
}

/// Decode, validate and open a package in one step.
pub fn open(
    bytes: &[u8],
    expected_dek_id: Option<u32>,
    dek: &Dek,
) -> Result<Opened, EnvelopeError> {
    let package = decode(bytes)?;
    check_header(&package.header, expected_dek_id)?;
    open_decoded(&package, dek)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealbox_crypto::generate_key;

    #[test]
    fn seal_open_round_trip() {
        let dek = generate_key();
        let sealed = seal(b"hunter2!", 7, &dek).unwrap();

        let opened = open(&sealed, Some(7), &dek).unwrap();
        assert_eq!(&opened.plaintext[..], b"hunter2!");
        assert_eq!(opened.header.dek_id, 7);
        assert_eq!(opened.header.alg, ALGORITHM);
        assert_eq!(opened.header.version, PACKAGE_VERSION);
    }

    #[test]
    fn encode_decode_round_trip() {
        let package = SecretPackage {
            header: PackageHeader::new(3),
            payload: vec![1, 2, 3, 4],
        };
        let bytes = encode(&package).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.header, package.header);
        assert_eq!(decoded.payload, package.payload);
    }

    #[test]
    fn header_bytes_are_deterministic() {
        let a = header_bytes(&PackageHeader::new(42)).unwrap();
        let b = header_bytes(&PackageHeader::new(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dek_id_mismatch_rejected() {
        let dek = generate_key();
        let sealed = seal(b"payload!", 1, &dek).unwrap();
        let err = open(&sealed, Some(2), &dek).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::DekMismatch {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn no_expected_dek_skips_the_check() {
        let dek = generate_key();
        let sealed = seal(b"payload!", 9, &dek).unwrap();
        let opened = open(&sealed, None, &dek).unwrap();
        assert_eq!(opened.header.dek_id, 9);
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let header = PackageHeader {
            alg: "XSalsa20".to_string(),
            version: 1,
            dek_id: 1,
        };
        assert!(matches!(
            check_header(&header, None),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn future_version_rejected() {
        let header = PackageHeader {
            alg: ALGORITHM.to_string(),
            version: PACKAGE_VERSION + 1,
            dek_id: 1,
        };
        assert!(matches!(
            check_header(&header, None),
            Err(EnvelopeError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn swapped_header_fails_authentication() {
        // Re-encoding the package with a different header must break the
        // AAD binding even though the payload is untouched.
        let dek = generate_key();
        let sealed = seal(b"payload!", 1, &dek).unwrap();
        let mut package = decode(&sealed).unwrap();
        package.header.dek_id = 2;

        let err = open_decoded(&package, &dek).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::Decrypt(sealbox_crypto::DecryptError::AuthenticationFailed)
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_authentication() {
        let dek = generate_key();
        let sealed = seal(b"payload!", 1, &dek).unwrap();
        let mut package = decode(&sealed).unwrap();
        let mid = package.payload.len() / 2;
        package.payload[mid] ^= 0x01;

        assert!(open_decoded(&package, &dek).is_err());
    }

    #[test]
    fn wrong_dek_fails_authentication() {
        let dek = generate_key();
        let other = generate_key();
        let sealed = seal(b"payload!", 1, &dek).unwrap();
        assert!(open(&sealed, Some(1), &other).is_err());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode(&[0xff; 3]),
            Err(EnvelopeError::Decode(_))
        ));
    }
}

//! Server configuration from environment variables.
//!
//! ```bash
//! # Auth
//! SEALBOX_AUTH_SECRET=<hex HMAC-SHA-256 signing key>   # required
//! SEALBOX_TOKEN_TTL_SECS=3600
//! SEALBOX_ADMIN_SECRET=...        # bootstrap admin password
//!
//! # KMS, development mode
//! SEALBOX_DEV_MODE=true
//! SEALBOX_DEV_KEK=<hex 32-byte KEK>
//!
//! # KMS, production mode
//! SEALBOX_KMS_ENDPOINT=https://kms.example.com
//! SEALBOX_KMS_PROJECT=acme
//! SEALBOX_KMS_LOCATION=global
//! SEALBOX_KMS_KEYRING=sealbox
//! SEALBOX_KMS_KEY=kek1
//! SEALBOX_KMS_TIMEOUT_SECS=5
//! ```

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Fallback bootstrap admin secret; a warning is logged when it is used.
pub const DEFAULT_ADMIN_SECRET: &str = "0000";

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_KMS_TIMEOUT_SECS: u64 = 5;

/// KEK id used by the development-mode KMS.
pub const DEV_KEK_ID: &str = "local";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("{0} is not valid hex")]
    InvalidHex(&'static str),
    #[error("{0} is not a valid number")]
    InvalidNumber(&'static str),
    #[error("SEALBOX_DEV_KEK must decode to 32 bytes, got {0}")]
    InvalidKekLength(usize),
}

#[derive(Clone)]
pub struct Config {
    pub kms: KmsSettings,
    pub signing_key: Vec<u8>,
    pub token_ttl_secs: i64,
    pub admin_secret: String,
    /// True when SEALBOX_ADMIN_SECRET was not set and the default applies.
    pub admin_secret_is_default: bool,
}

#[derive(Clone)]
pub enum KmsSettings {
    /// Locally-held KEK; selected with SEALBOX_DEV_MODE=true.
    Dev { kek: Vec<u8> },
    Remote {
        endpoint: String,
        project: String,
        location: String,
        key_ring: String,
        key: String,
        timeout: Duration,
    },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name))
}

fn hex_var(name: &'static str) -> Result<Vec<u8>, ConfigError> {
    hex::decode(required(name)?).map_err(|_| ConfigError::InvalidHex(name))
}

fn bool_var(name: &str) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let kms = if bool_var("SEALBOX_DEV_MODE") {
            let kek = hex_var("SEALBOX_DEV_KEK")?;
            if kek.len() != 32 {
                return Err(ConfigError::InvalidKekLength(kek.len()));
            }
            KmsSettings::Dev { kek }
        } else {
            let timeout_secs = match env::var("SEALBOX_KMS_TIMEOUT_SECS") {
                Ok(v) => v
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber("SEALBOX_KMS_TIMEOUT_SECS"))?,
                Err(_) => DEFAULT_KMS_TIMEOUT_SECS,
            };
            KmsSettings::Remote {
                endpoint: required("SEALBOX_KMS_ENDPOINT")?,
                project: required("SEALBOX_KMS_PROJECT")?,
                location: required("SEALBOX_KMS_LOCATION")?,
                key_ring: required("SEALBOX_KMS_KEYRING")?,
                key: required("SEALBOX_KMS_KEY")?,
                timeout: Duration::from_secs(timeout_secs),
            }
        };

        let signing_key = hex_var("SEALBOX_AUTH_SECRET")?;

        let token_ttl_secs = match env::var("SEALBOX_TOKEN_TTL_SECS") {
            Ok(v) => v
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidNumber("SEALBOX_TOKEN_TTL_SECS"))?,
            Err(_) => DEFAULT_TOKEN_TTL_SECS,
        };

        let (admin_secret, admin_secret_is_default) = match env::var("SEALBOX_ADMIN_SECRET") {
            Ok(v) => (v, false),
            Err(_) => (DEFAULT_ADMIN_SECRET.to_string(), true),
        };

        Ok(Self {
            kms,
            signing_key,
            token_ttl_secs,
            admin_secret,
            admin_secret_is_default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "SEALBOX_DEV_MODE",
        "SEALBOX_DEV_KEK",
        "SEALBOX_KMS_ENDPOINT",
        "SEALBOX_KMS_PROJECT",
        "SEALBOX_KMS_LOCATION",
        "SEALBOX_KMS_KEYRING",
        "SEALBOX_KMS_KEY",
        "SEALBOX_KMS_TIMEOUT_SECS",
        "SEALBOX_AUTH_SECRET",
        "SEALBOX_TOKEN_TTL_SECS",
        "SEALBOX_ADMIN_SECRET",
    ];

    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
    }

    impl<'a> EnvGuard<'a> {
        fn new() -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            for var in ENV_VARS {
                env::remove_var(var);
            }
            Self { _lock: lock }
        }

        fn set(&self, key: &str, value: &str) {
            env::set_var(key, value);
        }
    }

    impl<'a> Drop for EnvGuard<'a> {
        fn drop(&mut self) {
            for var in ENV_VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn dev_mode_config() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_DEV_MODE", "true");
        guard.set("SEALBOX_DEV_KEK", &"ab".repeat(32));
        guard.set("SEALBOX_AUTH_SECRET", &"cd".repeat(32));

        let config = Config::from_env().unwrap();
        assert!(matches!(config.kms, KmsSettings::Dev { ref kek } if kek.len() == 32));
        assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert!(config.admin_secret_is_default);
        assert_eq!(config.admin_secret, DEFAULT_ADMIN_SECRET);
    }

    #[test]
    fn dev_mode_requires_kek() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_DEV_MODE", "true");
        guard.set("SEALBOX_AUTH_SECRET", &"cd".repeat(32));

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingEnvVar("SEALBOX_DEV_KEK"))
        ));
    }

    #[test]
    fn dev_kek_must_be_32_bytes() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_DEV_MODE", "true");
        guard.set("SEALBOX_DEV_KEK", "abcd");
        guard.set("SEALBOX_AUTH_SECRET", &"cd".repeat(32));

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidKekLength(2))
        ));
    }

    #[test]
    fn remote_mode_requires_key_path_parts() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_AUTH_SECRET", &"cd".repeat(32));
        guard.set("SEALBOX_KMS_ENDPOINT", "https://kms.example.com");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingEnvVar("SEALBOX_KMS_PROJECT"))
        ));
    }

    #[test]
    fn remote_mode_full_config() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_AUTH_SECRET", &"cd".repeat(32));
        guard.set("SEALBOX_KMS_ENDPOINT", "https://kms.example.com");
        guard.set("SEALBOX_KMS_PROJECT", "acme");
        guard.set("SEALBOX_KMS_LOCATION", "global");
        guard.set("SEALBOX_KMS_KEYRING", "sealbox");
        guard.set("SEALBOX_KMS_KEY", "kek1");
        guard.set("SEALBOX_KMS_TIMEOUT_SECS", "9");
        guard.set("SEALBOX_TOKEN_TTL_SECS", "120");
        guard.set("SEALBOX_ADMIN_SECRET", "s3cret!!");

        let config = Config::from_env().unwrap();
        match config.kms {
            KmsSettings::Remote { ref key, timeout, .. } => {
                assert_eq!(key, "kek1");
                assert_eq!(timeout, Duration::from_secs(9));
            }
            _ => panic!("expected remote KMS settings"),
        }
        assert_eq!(config.token_ttl_secs, 120);
        assert!(!config.admin_secret_is_default);
    }

    #[test]
    fn signing_key_is_required() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_DEV_MODE", "true");
        guard.set("SEALBOX_DEV_KEK", &"ab".repeat(32));

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingEnvVar("SEALBOX_AUTH_SECRET"))
        ));
    }

    #[test]
    fn signing_key_must_be_hex() {
        let guard = EnvGuard::new();
        guard.set("SEALBOX_DEV_MODE", "true");
        guard.set("SEALBOX_DEV_KEK", &"ab".repeat(32));
        guard.set("SEALBOX_AUTH_SECRET", "not-hex!");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidHex("SEALBOX_AUTH_SECRET"))
        ));
    }
}

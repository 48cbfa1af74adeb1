//! Storage abstraction for sealbox.
//!
//! Backend crates (e.g. sealbox-store-sqlite) implement [`Store`] so the
//! service core doesn't depend on any specific database engine or schema
//! details. Four tables: clients, deks, secrets, folders.

use thiserror::Error;

pub mod store;
pub mod types;

pub use store::Store;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "test-support")]
pub use store::MockStore;

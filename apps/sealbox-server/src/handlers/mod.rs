//! Request semantics for every operation, independent of the HTTP layer.
//!
//! The axum routes in `http.rs` only extract the bearer token and the
//! request body; everything else (auth, validation, orchestration) lives on
//! the handler methods so it can be exercised directly in tests.

pub mod clients;
pub mod deks;
pub mod folders;
pub mod secrets;

//! Domain logic shared by the Vitrine API server and client.
//!
//! Nothing in this crate performs IO: it holds error types, id aliases,
//! form validation schemas, opaque-token helpers and billing arithmetic.

pub mod billing;
pub mod error;
pub mod forms;
pub mod roles;
pub mod tokens;
pub mod types;

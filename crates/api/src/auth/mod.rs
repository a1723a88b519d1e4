//! Authentication primitives.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//! - [`jwt`] -- JWT access-token generation and validation.
//!
//! Refresh, verification and reset tokens are opaque strings from
//! [`vitrine_core::tokens`].

pub mod jwt;
pub mod password;

//! Opaque bearer secrets: refresh tokens, email verification tokens and
//! password reset tokens.
//!
//! The plaintext is handed to the client exactly once. Only the SHA-256 hash
//! is persisted, so a database leak does not expose usable tokens.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a generated token (alphanumeric characters).
pub const TOKEN_LENGTH: usize = 48;

/// Purpose tag stored alongside single-use user tokens.
pub const PURPOSE_EMAIL_VERIFICATION: &str = "email_verification";
pub const PURPOSE_PASSWORD_RESET: &str = "password_reset";

/// Lifetime of an email verification token, in hours.
pub const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;

/// Lifetime of a password reset token, in minutes.
pub const PASSWORD_RESET_TTL_MINS: i64 = 60;

/// A freshly generated opaque token.
pub struct OpaqueToken {
    /// Sent to the client, never stored.
    pub plaintext: String,
    /// SHA-256 hex digest of `plaintext`; this is what the database keeps.
    pub hash: String,
}

/// Generate a new random token and its storage hash.
pub fn generate_opaque_token() -> OpaqueToken {
    let plaintext: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    let hash = hash_token(&plaintext);
    OpaqueToken { plaintext, hash }
}

/// Hash an incoming token for lookup: SHA-256 of the trimmed token, as hex.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.trim().as_bytes());
    format!("{digest:x}")
}

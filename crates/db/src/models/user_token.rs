//! Single-use tokens for email verification and password reset.

use sqlx::FromRow;
use vitrine_core::types::{DbId, Timestamp};

/// A row from the `user_tokens` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserToken {
    pub id: DbId,
    pub user_id: DbId,
    pub purpose: String,
    pub token_hash: String,
    pub expires_at: Timestamp,
    pub consumed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for issuing a token.
pub struct CreateUserToken<'a> {
    pub user_id: DbId,
    pub purpose: &'a str,
    pub token_hash: String,
    pub expires_at: Timestamp,
}

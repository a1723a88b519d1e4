//! User session model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vitrine_core::types::{DbId, Timestamp};

/// A user session row from the `user_sessions` table.
///
/// One row per issued refresh token. Rotation revokes the row and points
/// `replaced_by_id` at its successor.
#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub id: DbId,
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub is_revoked: bool,
    pub replaced_by_id: Option<DbId>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub last_used_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserSession {
    /// A revoked session that was rotated away (as opposed to logged out).
    pub fn was_rotated(&self) -> bool {
        self.is_revoked && self.replaced_by_id.is_some()
    }
}

/// Session listing entry returned by `GET /auth/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: DbId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: Timestamp,
    pub last_used_at: Timestamp,
    pub expires_at: Timestamp,
    pub current: bool,
}

impl SessionResponse {
    pub fn from_session(session: &UserSession, current_id: DbId) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent.clone(),
            ip_address: session.ip_address.clone(),
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
            current: session.id == current_id,
        }
    }
}

/// DTO for creating a new user session.
pub struct CreateSession {
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

//! Repository for the `user_tokens` table (email verification and
//! password reset tokens).

use sqlx::PgPool;
use vitrine_core::types::DbId;

use crate::models::user_token::{CreateUserToken, UserToken};

const COLUMNS: &str = "id, user_id, purpose, token_hash, expires_at, consumed_at, created_at";

/// Provides issue/consume operations for single-use user tokens.
pub struct UserTokenRepo;

impl UserTokenRepo {
    /// Issue a token, invalidating any earlier unconsumed token of the same
    /// purpose for the same user.
    pub async fn issue(pool: &PgPool, input: &CreateUserToken<'_>) -> Result<UserToken, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE user_tokens SET consumed_at = NOW()
             WHERE user_id = $1 AND purpose = $2 AND consumed_at IS NULL",
        )
        .bind(input.user_id)
        .bind(input.purpose)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO user_tokens (user_id, purpose, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let token = sqlx::query_as::<_, UserToken>(&query)
            .bind(input.user_id)
            .bind(input.purpose)
            .bind(&input.token_hash)
            .bind(input.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(token)
    }

    /// Atomically consume a valid token, returning its owner.
    ///
    /// A token is valid while unconsumed and unexpired. The conditional
    /// UPDATE makes consumption single-use even under concurrent requests.
    pub async fn consume(
        pool: &PgPool,
        purpose: &str,
        token_hash: &str,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> = sqlx::query_as(
            "UPDATE user_tokens SET consumed_at = NOW()
             WHERE token_hash = $1 AND purpose = $2
               AND consumed_at IS NULL
               AND expires_at > NOW()
             RETURNING user_id",
        )
        .bind(token_hash)
        .bind(purpose)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Delete consumed tokens and tokens past their expiry.
    pub async fn cleanup(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM user_tokens WHERE consumed_at IS NOT NULL OR expires_at < NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

//! Repository for the `payment_methods` table.
//!
//! At most one card per user is flagged default (enforced by a partial
//! unique index). Every method that moves the flag first locks the owner's
//! `users` row, so concurrent writes for one user run one after another.

use sqlx::{PgPool, Postgres, Transaction};
use vitrine_core::types::DbId;

use crate::models::payment_method::{CreatePaymentMethod, PaymentMethod};

const COLUMNS: &str =
    "id, user_id, brand, last4, exp_month, exp_year, is_default, created_at, updated_at";

/// Provides CRUD operations for stored cards.
pub struct PaymentMethodRepo;

impl PaymentMethodRepo {
    /// Add a card. It becomes the default when requested or when it is the
    /// user's first card.
    pub async fn create(
        pool: &PgPool,
        input: &CreatePaymentMethod,
    ) -> Result<PaymentMethod, sqlx::Error> {
        let mut tx = pool.begin().await?;
        Self::lock_owner(&mut tx, input.user_id).await?;

        let (existing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payment_methods WHERE user_id = $1")
                .bind(input.user_id)
                .fetch_one(&mut *tx)
                .await?;
        let make_default = input.make_default || existing == 0;

        if make_default {
            sqlx::query(
                "UPDATE payment_methods SET is_default = false
                 WHERE user_id = $1 AND is_default = true",
            )
            .bind(input.user_id)
            .execute(&mut *tx)
            .await?;
        }

        let query = format!(
            "INSERT INTO payment_methods (user_id, brand, last4, exp_month, exp_year, is_default)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        let method = sqlx::query_as::<_, PaymentMethod>(&query)
            .bind(input.user_id)
            .bind(&input.brand)
            .bind(&input.last4)
            .bind(input.exp_month)
            .bind(input.exp_year)
            .bind(make_default)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(method)
    }

    /// Find a card owned by `user_id`.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<PaymentMethod>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payment_methods WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, PaymentMethod>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_default(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<PaymentMethod>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM payment_methods WHERE user_id = $1 AND is_default = true"
        );
        sqlx::query_as::<_, PaymentMethod>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's cards, default first then newest.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<PaymentMethod>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM payment_methods
             WHERE user_id = $1
             ORDER BY is_default DESC, created_at DESC, id DESC"
        );
        sqlx::query_as::<_, PaymentMethod>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Flag a card as the user's default. Returns `None` if the card does
    /// not exist or is not owned by the user.
    pub async fn set_default(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<PaymentMethod>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        Self::lock_owner(&mut tx, user_id).await?;

        sqlx::query(
            "UPDATE payment_methods SET is_default = false
             WHERE user_id = $1 AND is_default = true AND id <> $2",
        )
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "UPDATE payment_methods SET is_default = true
             WHERE id = $1 AND user_id = $2
             RETURNING {COLUMNS}"
        );
        let method = sqlx::query_as::<_, PaymentMethod>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if method.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(method)
    }

    /// Remove a card. If it was the default, the newest remaining card is
    /// promoted. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId, user_id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        Self::lock_owner(&mut tx, user_id).await?;

        let deleted: Option<(bool,)> = sqlx::query_as(
            "DELETE FROM payment_methods WHERE id = $1 AND user_id = $2 RETURNING is_default",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((was_default,)) = deleted else {
            tx.rollback().await?;
            return Ok(false);
        };

        if was_default {
            sqlx::query(
                "UPDATE payment_methods SET is_default = true
                 WHERE id = (
                    SELECT id FROM payment_methods
                    WHERE user_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                 )",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn lock_owner(
        tx: &mut Transaction<'_, Postgres>,
        user_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

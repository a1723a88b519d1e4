//! Repository for the `invoices` table.

use sqlx::{PgPool, Postgres, Transaction};
use vitrine_core::billing::{invoice_number, InvoiceStatus, SubscriptionStatus};
use vitrine_core::types::DbId;

use crate::models::invoice::{CreateInvoice, Invoice};

pub(crate) const COLUMNS: &str = "id, user_id, subscription_id, plan_id, number, description, \
    subtotal_cents, discount_cents, amount_due_cents, currency, status, period_start, period_end, \
    due_at, paid_at, payment_method_id, created_at, updated_at";

/// Provides issue/list/pay operations for invoices.
pub struct InvoiceRepo;

impl InvoiceRepo {
    /// Issue a standalone invoice.
    pub async fn create(pool: &PgPool, input: &CreateInvoice) -> Result<Invoice, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let invoice = Self::insert_in_tx(&mut tx, input).await?;
        tx.commit().await?;
        Ok(invoice)
    }

    /// List a user's invoices, newest first.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Invoice>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM invoices WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Invoice>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Find an invoice owned by `user_id`.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Invoice>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM invoices WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Invoice>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Settle an open invoice.
    ///
    /// When the invoice belongs to a `past_due` subscription and no other
    /// invoice of it remains open, the subscription returns to `active`.
    /// Returns `None` if the invoice is missing, not owned, or not open.
    pub async fn mark_paid(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
        payment_method_id: DbId,
    ) -> Result<Option<Invoice>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE invoices SET status = $4, paid_at = NOW(), payment_method_id = $3
             WHERE id = $1 AND user_id = $2 AND status = $5
             RETURNING {COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&query)
            .bind(id)
            .bind(user_id)
            .bind(payment_method_id)
            .bind(InvoiceStatus::Paid.as_str())
            .bind(InvoiceStatus::Open.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(invoice) = invoice else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(subscription_id) = invoice.subscription_id {
            sqlx::query(
                "UPDATE subscriptions SET status = $2
                 WHERE id = $1 AND status = $3
                   AND NOT EXISTS (
                     SELECT 1 FROM invoices WHERE subscription_id = $1 AND status = $4
                   )",
            )
            .bind(subscription_id)
            .bind(SubscriptionStatus::Active.as_str())
            .bind(SubscriptionStatus::PastDue.as_str())
            .bind(InvoiceStatus::Open.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(invoice))
    }

    /// Insert an invoice inside an existing transaction.
    ///
    /// Locks the owning user row so invoice numbers are assigned serially per
    /// user. An invoice charged to a payment method, or with nothing due, is
    /// settled on creation; anything else is left open.
    pub(crate) async fn insert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateInvoice,
    ) -> Result<Invoice, sqlx::Error> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(input.user_id)
            .execute(&mut **tx)
            .await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE user_id = $1")
            .bind(input.user_id)
            .fetch_one(&mut **tx)
            .await?;
        let number = invoice_number(input.user_id, count + 1);

        let status = match input.payment_method_id {
            Some(_) => InvoiceStatus::Paid,
            None => InvoiceStatus::for_amount(input.amount_due_cents),
        };
        let query = format!(
            "INSERT INTO invoices
                (user_id, subscription_id, plan_id, number, description, subtotal_cents,
                 discount_cents, amount_due_cents, currency, status, period_start, period_end,
                 due_at, paid_at, payment_method_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                     CASE WHEN $10 = 'paid' THEN NOW() END, $14)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&query)
            .bind(input.user_id)
            .bind(input.subscription_id)
            .bind(input.plan_id)
            .bind(&number)
            .bind(&input.description)
            .bind(input.subtotal_cents)
            .bind(input.discount_cents)
            .bind(input.amount_due_cents)
            .bind(&input.currency)
            .bind(status.as_str())
            .bind(input.period_start)
            .bind(input.period_end)
            .bind(input.due_at)
            .bind(input.payment_method_id)
            .fetch_one(&mut **tx)
            .await
    }

    /// Void every open invoice of a subscription inside a transaction.
    pub(crate) async fn void_open_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        subscription_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invoices SET status = $2 WHERE subscription_id = $1 AND status = $3",
        )
        .bind(subscription_id)
        .bind(InvoiceStatus::Void.as_str())
        .bind(InvoiceStatus::Open.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}

//! Repository for the `subscriptions` table.
//!
//! Lifecycle changes that also touch invoices or coupons run in a single
//! transaction so a subscription never exists without its first invoice.

use sqlx::PgPool;
use vitrine_core::billing::SubscriptionStatus;
use vitrine_core::types::{DbId, Timestamp};

use crate::models::invoice::{CreateInvoice, Invoice};
use crate::models::subscription::{CreateSubscription, RenewSubscription, Subscription};
use crate::repositories::InvoiceRepo;

const COLUMNS: &str = "id, user_id, plan_id, status, current_period_start, current_period_end, \
    trial_end, cancel_at_period_end, canceled_at, coupon_id, created_at, updated_at";

/// Provides lifecycle operations for subscriptions.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions WHERE id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The user's live (non-canceled) subscription, if any.
    pub async fn find_live_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE user_id = $1 AND status <> $2"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .bind(SubscriptionStatus::Canceled.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Start a subscription, redeem its coupon and issue the first invoice.
    ///
    /// `first_invoice.subscription_id` is overwritten with the new row's id.
    /// Returns `None` when the coupon ran out of redemptions between
    /// validation and this insert; nothing is written in that case.
    pub async fn start(
        pool: &PgPool,
        input: &CreateSubscription,
        first_invoice: Option<&CreateInvoice>,
    ) -> Result<Option<(Subscription, Option<Invoice>)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if let Some(coupon_id) = input.coupon_id {
            let redeemed = sqlx::query(
                "UPDATE coupons SET times_redeemed = times_redeemed + 1
                 WHERE id = $1
                   AND (max_redemptions IS NULL OR times_redeemed < max_redemptions)",
            )
            .bind(coupon_id)
            .execute(&mut *tx)
            .await?;
            if redeemed.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        let query = format!(
            "INSERT INTO subscriptions
                (user_id, plan_id, status, current_period_start, current_period_end, trial_end, coupon_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(input.user_id)
            .bind(input.plan_id)
            .bind(input.status.as_str())
            .bind(input.current_period_start)
            .bind(input.current_period_end)
            .bind(input.trial_end)
            .bind(input.coupon_id)
            .fetch_one(&mut *tx)
            .await?;

        let invoice = match first_invoice {
            Some(draft) => {
                let draft = CreateInvoice {
                    subscription_id: Some(subscription.id),
                    ..draft.clone()
                };
                Some(InvoiceRepo::insert_in_tx(&mut tx, &draft).await?)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(Some((subscription, invoice)))
    }

    /// Move a live subscription to another plan, optionally restarting its
    /// period, and issue the proration invoice if one is given.
    pub async fn change_plan(
        pool: &PgPool,
        id: DbId,
        plan_id: DbId,
        new_period: Option<(Timestamp, Timestamp)>,
        invoice: Option<&CreateInvoice>,
    ) -> Result<Option<(Subscription, Option<Invoice>)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE subscriptions SET
                plan_id = $2,
                current_period_start = COALESCE($3, current_period_start),
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = false
             WHERE id = $1 AND status <> $5
             RETURNING {COLUMNS}"
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(plan_id)
            .bind(new_period.map(|(start, _)| start))
            .bind(new_period.map(|(_, end)| end))
            .bind(SubscriptionStatus::Canceled.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(subscription) = subscription else {
            tx.rollback().await?;
            return Ok(None);
        };

        let invoice = match invoice {
            Some(draft) => Some(InvoiceRepo::insert_in_tx(&mut tx, draft).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Some((subscription, invoice)))
    }

    /// Set or clear the cancel-at-period-end flag of a live subscription.
    pub async fn set_cancel_at_period_end(
        pool: &PgPool,
        id: DbId,
        flag: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET cancel_at_period_end = $2
             WHERE id = $1 AND status <> $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(flag)
            .bind(SubscriptionStatus::Canceled.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Cancel a live subscription immediately and void its open invoices.
    pub async fn cancel_now(pool: &PgPool, id: DbId) -> Result<Option<Subscription>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE subscriptions SET
                status = $2,
                canceled_at = NOW(),
                cancel_at_period_end = false
             WHERE id = $1 AND status <> $2
             RETURNING {COLUMNS}"
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(SubscriptionStatus::Canceled.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if subscription.is_some() {
            InvoiceRepo::void_open_in_tx(&mut tx, id).await?;
        }

        tx.commit().await?;
        Ok(subscription)
    }

    /// Live subscriptions whose current period has ended by `now`.
    pub async fn list_due_for_renewal(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subscriptions
             WHERE status <> $1 AND current_period_end <= $2
             ORDER BY current_period_end ASC
             LIMIT $3"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(SubscriptionStatus::Canceled.as_str())
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Advance a subscription to its next period and issue the renewal
    /// invoice. The period guard makes a repeated sweep a no-op.
    pub async fn renew(
        pool: &PgPool,
        input: &RenewSubscription,
        invoice: Option<&CreateInvoice>,
    ) -> Result<Option<(Subscription, Option<Invoice>)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE subscriptions SET
                status = $2,
                current_period_start = $3,
                current_period_end = $4
             WHERE id = $1 AND status <> $5 AND current_period_end <= $3
             RETURNING {COLUMNS}"
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(input.id)
            .bind(input.status.as_str())
            .bind(input.current_period_start)
            .bind(input.current_period_end)
            .bind(SubscriptionStatus::Canceled.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(subscription) = subscription else {
            tx.rollback().await?;
            return Ok(None);
        };

        let invoice = match invoice {
            Some(draft) => Some(InvoiceRepo::insert_in_tx(&mut tx, draft).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Some((subscription, invoice)))
    }
}

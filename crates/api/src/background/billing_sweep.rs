//! Periodic subscription renewal and housekeeping.
//!
//! Each pass looks at live subscriptions whose period has ended:
//!
//! - flagged `cancel_at_period_end`: canceled;
//! - otherwise: advanced one period with a renewal invoice. The invoice is
//!   charged to the owner's default card; without a usable card it stays
//!   open and the subscription goes `past_due`.
//!
//! The pass also purges dead sessions and spent single-use tokens.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use vitrine_core::billing::{advance_period, InvoiceAmounts, SubscriptionStatus};
use vitrine_core::types::Timestamp;
use vitrine_db::models::invoice::CreateInvoice;
use vitrine_db::models::subscription::{RenewSubscription, Subscription};
use vitrine_db::repositories::{
    CouponRepo, PaymentMethodRepo, PlanRepo, SessionRepo, SubscriptionRepo, UserTokenRepo,
};

/// Subscriptions handled per pass. Anything left over is picked up next time.
const BATCH_SIZE: i64 = 200;

/// Counters for one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Advanced to a new period with the renewal invoice settled.
    pub renewed: u64,
    /// Advanced to a new period with the renewal invoice left open.
    pub past_due: u64,
    /// Ended because cancellation was scheduled for the period end.
    pub canceled: u64,
    /// Subscriptions that could not be processed this pass.
    pub failed: u64,
    pub sessions_deleted: u64,
    pub tokens_deleted: u64,
}

enum Outcome {
    Renewed,
    PastDue,
    Canceled,
    Skipped,
}

/// Run the billing sweep loop until `cancel` is triggered.
pub async fn run(pool: PgPool, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Billing sweep started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Billing sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(&pool, Utc::now()).await {
                    Ok(report) if report == SweepReport::default() => {
                        tracing::debug!("Billing sweep: nothing to do");
                    }
                    Ok(report) => {
                        tracing::info!(
                            renewed = report.renewed,
                            past_due = report.past_due,
                            canceled = report.canceled,
                            failed = report.failed,
                            sessions_deleted = report.sessions_deleted,
                            tokens_deleted = report.tokens_deleted,
                            "Billing sweep completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Billing sweep failed");
                    }
                }
            }
        }
    }
}

/// One sweep pass as of `now`.
///
/// Each subscription advances at most one period per pass. A failure on one
/// subscription is logged and counted; the rest of the batch still runs.
pub async fn sweep_once(pool: &PgPool, now: Timestamp) -> Result<SweepReport, sqlx::Error> {
    let mut report = SweepReport::default();

    let due = SubscriptionRepo::list_due_for_renewal(pool, now, BATCH_SIZE).await?;
    for subscription in due {
        match process(pool, &subscription, now).await {
            Ok(Outcome::Renewed) => report.renewed += 1,
            Ok(Outcome::PastDue) => report.past_due += 1,
            Ok(Outcome::Canceled) => report.canceled += 1,
            Ok(Outcome::Skipped) => {}
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    error = %e,
                    subscription_id = subscription.id,
                    "Billing sweep: subscription failed"
                );
            }
        }
    }

    report.sessions_deleted = SessionRepo::cleanup_expired(pool).await?;
    report.tokens_deleted = UserTokenRepo::cleanup(pool).await?;
    Ok(report)
}

async fn process(
    pool: &PgPool,
    subscription: &Subscription,
    now: Timestamp,
) -> Result<Outcome, sqlx::Error> {
    if subscription.cancel_at_period_end {
        let canceled = SubscriptionRepo::cancel_now(pool, subscription.id).await?;
        if canceled.is_some() {
            tracing::info!(subscription_id = subscription.id, "Subscription ended at period end");
            return Ok(Outcome::Canceled);
        }
        return Ok(Outcome::Skipped);
    }

    let Some(plan) = PlanRepo::find_by_id(pool, subscription.plan_id).await? else {
        tracing::warn!(
            subscription_id = subscription.id,
            plan_id = subscription.plan_id,
            "Billing sweep: plan missing, skipping"
        );
        return Ok(Outcome::Skipped);
    };

    let discount = match subscription.coupon_id {
        Some(id) => CouponRepo::find_by_id(pool, id)
            .await?
            .and_then(|c| c.discount()),
        None => None,
    };
    let amounts = InvoiceAmounts::compute(plan.price_cents, discount);

    let card = if amounts.amount_due_cents > 0 {
        PaymentMethodRepo::find_default(pool, subscription.user_id)
            .await?
            .filter(|c| c.is_valid_on(now))
            .map(|c| c.id)
    } else {
        None
    };

    let settled = amounts.amount_due_cents == 0 || card.is_some();
    // Earlier unpaid invoices keep a past-due subscription past due.
    let status = if settled && subscription.status() != SubscriptionStatus::PastDue {
        SubscriptionStatus::Active
    } else {
        SubscriptionStatus::PastDue
    };

    let start = subscription.current_period_end;
    let end = advance_period(start, plan.interval());
    let draft = CreateInvoice {
        user_id: subscription.user_id,
        subscription_id: Some(subscription.id),
        plan_id: plan.id,
        description: format!("Renovação {}", plan.name),
        subtotal_cents: amounts.subtotal_cents,
        discount_cents: amounts.discount_cents,
        amount_due_cents: amounts.amount_due_cents,
        currency: plan.currency.clone(),
        period_start: start,
        period_end: end,
        due_at: start,
        payment_method_id: card,
    };
    let input = RenewSubscription {
        id: subscription.id,
        status,
        current_period_start: start,
        current_period_end: end,
    };

    let Some((renewed, invoice)) = SubscriptionRepo::renew(pool, &input, Some(&draft)).await? else {
        // Another pass advanced it first.
        return Ok(Outcome::Skipped);
    };

    tracing::info!(
        subscription_id = renewed.id,
        status = %renewed.status,
        invoice = invoice.as_ref().map(|i| i.number.as_str()).unwrap_or("-"),
        amount_cents = amounts.amount_due_cents,
        "Subscription renewed"
    );

    Ok(match status {
        SubscriptionStatus::Active => Outcome::Renewed,
        _ => Outcome::PastDue,
    })
}

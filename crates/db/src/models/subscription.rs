//! Subscription entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vitrine_core::billing::SubscriptionStatus;
use vitrine_core::types::{DbId, Timestamp};

/// A row from the `subscriptions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: DbId,
    pub user_id: DbId,
    pub plan_id: DbId,
    pub status: String,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub trial_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub coupon_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::parse(&self.status).unwrap_or(SubscriptionStatus::Canceled)
    }
}

/// DTO for starting a subscription. The first invoice, if any, is created
/// in the same transaction.
#[derive(Debug)]
pub struct CreateSubscription {
    pub user_id: DbId,
    pub plan_id: DbId,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub trial_end: Option<Timestamp>,
    pub coupon_id: Option<DbId>,
}

/// Period advance applied by the renewal sweep.
#[derive(Debug)]
pub struct RenewSubscription {
    pub id: DbId,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
}

//! Coupon entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vitrine_core::billing::{coupon_usable, Discount};
use vitrine_core::types::{DbId, Timestamp};

/// A row from the `coupons` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Coupon {
    pub id: DbId,
    pub code: String,
    pub percent_off: Option<i32>,
    pub amount_off_cents: Option<i64>,
    pub max_redemptions: Option<i32>,
    pub times_redeemed: i32,
    pub valid_until: Option<Timestamp>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Coupon {
    pub fn discount(&self) -> Option<Discount> {
        Discount::from_columns(self.percent_off, self.amount_off_cents)
    }

    pub fn is_usable(&self, now: Timestamp) -> bool {
        self.discount().is_some()
            && coupon_usable(
                self.is_active,
                self.valid_until,
                self.max_redemptions,
                self.times_redeemed,
                now,
            )
    }
}

/// DTO for creating a coupon.
#[derive(Debug)]
pub struct CreateCoupon {
    pub code: String,
    pub percent_off: Option<i32>,
    pub amount_off_cents: Option<i64>,
    pub max_redemptions: Option<i32>,
    pub valid_until: Option<Timestamp>,
}

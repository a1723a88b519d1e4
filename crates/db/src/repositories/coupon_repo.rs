//! Repository for the `coupons` table.

use sqlx::PgPool;
use vitrine_core::types::DbId;

use crate::models::coupon::{Coupon, CreateCoupon};

const COLUMNS: &str = "id, code, percent_off, amount_off_cents, max_redemptions, times_redeemed, \
                        valid_until, is_active, created_at, updated_at";

/// Provides create/lookup operations for coupons. Redemption happens inside
/// [`SubscriptionRepo::start`](super::SubscriptionRepo::start).
pub struct CouponRepo;

impl CouponRepo {
    pub async fn create(pool: &PgPool, input: &CreateCoupon) -> Result<Coupon, sqlx::Error> {
        let query = format!(
            "INSERT INTO coupons (code, percent_off, amount_off_cents, max_redemptions, valid_until)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Coupon>(&query)
            .bind(&input.code)
            .bind(input.percent_off)
            .bind(input.amount_off_cents)
            .bind(input.max_redemptions)
            .bind(input.valid_until)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Coupon>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM coupons WHERE id = $1");
        sqlx::query_as::<_, Coupon>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Look up a coupon by its normalized (uppercased) code.
    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Coupon>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM coupons WHERE code = $1");
        sqlx::query_as::<_, Coupon>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }
}

//! Stored card records. Only display data is kept; there is no card number
//! or provider token.

use serde::Serialize;
use sqlx::FromRow;
use vitrine_core::billing::card_valid_on;
use vitrine_core::types::{DbId, Timestamp};

/// A row from the `payment_methods` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentMethod {
    pub id: DbId,
    pub user_id: DbId,
    pub brand: String,
    pub last4: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub is_default: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PaymentMethod {
    /// Whether the card can still be charged at `now`.
    pub fn is_valid_on(&self, now: Timestamp) -> bool {
        card_valid_on(self.exp_year, self.exp_month, now)
    }
}

/// DTO for adding a card.
#[derive(Debug)]
pub struct CreatePaymentMethod {
    pub user_id: DbId,
    pub brand: String,
    pub last4: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub make_default: bool,
}

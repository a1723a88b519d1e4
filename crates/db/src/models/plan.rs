//! Plan entity model and DTOs.

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use vitrine_core::billing::PlanInterval;
use vitrine_core::types::{DbId, Timestamp};

/// A row from the `plans` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Plan {
    pub id: DbId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub billing_interval: String,
    pub trial_days: i32,
    pub features: Json<Vec<String>>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Plan {
    /// Parsed billing interval. The column is CHECK-constrained, so an
    /// unknown value means the row predates a schema change; treat it as
    /// monthly.
    pub fn interval(&self) -> PlanInterval {
        PlanInterval::parse(&self.billing_interval).unwrap_or(PlanInterval::Month)
    }
}

/// DTO for creating a plan.
#[derive(Debug)]
pub struct CreatePlan {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub billing_interval: String,
    pub trial_days: i32,
    pub features: Vec<String>,
}

/// DTO for updating a plan. All fields are optional.
#[derive(Debug, Default)]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub trial_days: Option<i32>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

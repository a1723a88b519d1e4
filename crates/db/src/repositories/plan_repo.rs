//! Repository for the `plans` table.

use sqlx::types::Json;
use sqlx::PgPool;
use vitrine_core::types::DbId;

use crate::models::plan::{CreatePlan, Plan, UpdatePlan};

const COLUMNS: &str = "id, code, name, description, price_cents, currency, billing_interval, \
                        trial_days, features, is_active, created_at, updated_at";

/// Provides CRUD operations for plans.
pub struct PlanRepo;

impl PlanRepo {
    pub async fn create(pool: &PgPool, input: &CreatePlan) -> Result<Plan, sqlx::Error> {
        let query = format!(
            "INSERT INTO plans
                (code, name, description, price_cents, currency, billing_interval, trial_days, features)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Plan>(&query)
            .bind(&input.code)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.price_cents)
            .bind(&input.currency)
            .bind(&input.billing_interval)
            .bind(input.trial_days)
            .bind(Json(&input.features))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Plan>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM plans WHERE id = $1");
        sqlx::query_as::<_, Plan>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active plans, cheapest first.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Plan>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM plans WHERE is_active = true ORDER BY price_cents ASC, id ASC"
        );
        sqlx::query_as::<_, Plan>(&query).fetch_all(pool).await
    }

    /// Update a plan. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdatePlan,
    ) -> Result<Option<Plan>, sqlx::Error> {
        let query = format!(
            "UPDATE plans SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                trial_days = COALESCE($5, trial_days),
                features = COALESCE($6, features),
                is_active = COALESCE($7, is_active)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Plan>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.price_cents)
            .bind(input.trial_days)
            .bind(input.features.as_ref().map(Json))
            .bind(input.is_active)
            .fetch_optional(pool)
            .await
    }
}

//! Admin-only catalog management: plans and coupons.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use vitrine_core::error::CoreError;
use vitrine_core::forms::{self, CreateCouponForm, CreatePlanForm, UpdatePlanForm};
use vitrine_core::types::DbId;
use vitrine_db::models::coupon::{Coupon, CreateCoupon};
use vitrine_db::models::plan::{CreatePlan, Plan, UpdatePlan};
use vitrine_db::repositories::{CouponRepo, PlanRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/admin/plans
pub async fn create_plan(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(form): Json<CreatePlanForm>,
) -> AppResult<(StatusCode, Json<DataResponse<Plan>>)> {
    forms::validate_form(&form)?;

    let input = CreatePlan {
        code: form.code.trim().to_lowercase(),
        name: form.name.trim().to_string(),
        description: form.description,
        price_cents: form.price_cents,
        currency: form.currency.to_uppercase(),
        billing_interval: form.interval,
        trial_days: form.trial_days,
        features: form.features,
    };
    let plan = PlanRepo::create(&state.pool, &input).await?;

    tracing::info!(admin_id = admin.user_id, plan_id = plan.id, code = %plan.code, "Plan created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: plan })))
}

/// PUT /api/v1/admin/plans/{id}
///
/// Price changes apply from the next invoice on; existing periods are not
/// re-billed.
pub async fn update_plan(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(form): Json<UpdatePlanForm>,
) -> AppResult<Json<DataResponse<Plan>>> {
    forms::validate_form(&form)?;

    let input = UpdatePlan {
        name: form.name.map(|n| n.trim().to_string()),
        description: form.description,
        price_cents: form.price_cents,
        trial_days: form.trial_days,
        features: form.features,
        is_active: form.is_active,
    };
    let plan = PlanRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Plan", id }))?;

    tracing::info!(admin_id = admin.user_id, plan_id = plan.id, "Plan updated");
    Ok(Json(DataResponse { data: plan }))
}

/// POST /api/v1/admin/coupons
pub async fn create_coupon(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(form): Json<CreateCouponForm>,
) -> AppResult<(StatusCode, Json<DataResponse<Coupon>>)> {
    let form = form.normalized();
    forms::validate_form(&form)?;

    let input = CreateCoupon {
        code: form.code,
        percent_off: form.percent_off,
        amount_off_cents: form.amount_off_cents,
        max_redemptions: form.max_redemptions,
        valid_until: form.valid_until,
    };
    let coupon = CouponRepo::create(&state.pool, &input).await?;

    tracing::info!(admin_id = admin.user_id, coupon_id = coupon.id, code = %coupon.code, "Coupon created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: coupon })))
}

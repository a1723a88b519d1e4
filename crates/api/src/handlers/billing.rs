//! Handlers for the `/billing` resource: plans, coupons, the caller's
//! subscription, invoices and stored cards.
//!
//! There is no payment provider. Charging an invoice to a card marks it
//! paid; an invoice without a card stays open until the user pays it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use vitrine_core::billing::{
    advance_period, prorate_plan_change, trial_end, unused_share, Discount, InvoiceAmounts,
    InvoiceStatus, SubscriptionStatus,
};
use vitrine_core::error::CoreError;
use vitrine_core::forms::{
    self, normalize_coupon_code, AddPaymentMethodForm, CancelSubscriptionForm, ChangePlanForm,
    PayInvoiceForm, SubscribeForm, ValidateCouponForm, MSG_CARD_EXPIRED, MSG_COUPON_INVALID,
    MSG_PAYMENT_METHOD_INVALID, MSG_PLAN_INVALID,
};
use vitrine_core::types::{DbId, Timestamp};
use vitrine_db::models::coupon::Coupon;
use vitrine_db::models::invoice::{CreateInvoice, Invoice};
use vitrine_db::models::payment_method::{CreatePaymentMethod, PaymentMethod};
use vitrine_db::models::plan::Plan;
use vitrine_db::models::subscription::{CreateSubscription, Subscription};
use vitrine_db::repositories::{
    CouponRepo, InvoiceRepo, PaymentMethodRepo, PlanRepo, SubscriptionRepo,
};
use vitrine_db::DbPool;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const MSG_NO_SUBSCRIPTION: &str = "Nenhuma assinatura ativa";
const MSG_ALREADY_SUBSCRIBED: &str = "Você já possui uma assinatura ativa";
const MSG_SAME_PLAN: &str = "Você já assina este plano";
const MSG_NOTHING_TO_RESUME: &str = "Não há cancelamento agendado para esta assinatura";
const MSG_INVOICE_NOT_OPEN: &str = "A fatura não está em aberto";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Short subscription description embedded in `GET /auth/me`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub id: DbId,
    pub status: String,
    pub plan_id: DbId,
    pub plan_code: String,
    pub plan_name: String,
    pub current_period_end: Timestamp,
    pub trial_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
}

/// A subscription row with its plan expanded.
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan: Plan,
}

/// Result of subscribe and change-plan: the subscription and the invoice
/// the action produced, if any.
#[derive(Debug, Serialize)]
pub struct SubscriptionChange {
    pub subscription: SubscriptionView,
    pub invoice: Option<Invoice>,
}

/// Preview of a coupon applied to a plan's price.
#[derive(Debug, Serialize)]
pub struct CouponPreview {
    pub code: String,
    pub plan_id: DbId,
    pub currency: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub amount_due_cents: i64,
}

// ---------------------------------------------------------------------------
// Plans and coupons
// ---------------------------------------------------------------------------

/// GET /api/v1/billing/plans
pub async fn list_plans(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<Plan>>>> {
    let plans = PlanRepo::list_active(&state.pool).await?;
    Ok(Json(DataResponse { data: plans }))
}

/// GET /api/v1/billing/plans/{id}
pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Plan>>> {
    let plan = PlanRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|p| p.is_active)
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Plan", id }))?;
    Ok(Json(DataResponse { data: plan }))
}

/// POST /api/v1/billing/coupons/validate
pub async fn validate_coupon(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(mut form): Json<ValidateCouponForm>,
) -> AppResult<Json<DataResponse<CouponPreview>>> {
    form.code = normalize_coupon_code(&form.code);
    forms::validate_form(&form)?;

    let plan = active_plan(&state.pool, form.plan_id).await?;
    let coupon = usable_coupon(&state.pool, &form.code, "code").await?;
    let amounts = InvoiceAmounts::compute(plan.price_cents, coupon.discount());

    Ok(Json(DataResponse {
        data: CouponPreview {
            code: coupon.code,
            plan_id: plan.id,
            currency: plan.currency,
            subtotal_cents: amounts.subtotal_cents,
            discount_cents: amounts.discount_cents,
            amount_due_cents: amounts.amount_due_cents,
        },
    }))
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// GET /api/v1/billing/subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<SubscriptionView>>> {
    let subscription = live_subscription(&state.pool, auth.user_id).await?;
    let view = subscription_view(&state.pool, subscription).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/billing/subscription
///
/// Plans with a trial start `trialing` without an invoice. Otherwise the
/// subscription starts `active` with its first invoice, charged to the
/// given card when there is one.
pub async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(mut form): Json<SubscribeForm>,
) -> AppResult<(StatusCode, Json<DataResponse<SubscriptionChange>>)> {
    form.coupon_code = form
        .coupon_code
        .as_deref()
        .map(normalize_coupon_code)
        .filter(|c| !c.is_empty());
    forms::validate_form(&form)?;

    if SubscriptionRepo::find_live_for_user(&state.pool, auth.user_id)
        .await?
        .is_some()
    {
        return Err(AppError::conflict(MSG_ALREADY_SUBSCRIBED));
    }

    let now = Utc::now();
    let plan = active_plan(&state.pool, form.plan_id).await?;
    let coupon = match &form.coupon_code {
        Some(code) => Some(usable_coupon(&state.pool, code, "coupon_code").await?),
        None => None,
    };
    let card = match form.payment_method_id {
        Some(id) => Some(chargeable_card(&state.pool, id, auth.user_id, now).await?),
        None => None,
    };

    let (input, first_invoice) = if plan.trial_days > 0 {
        let end = trial_end(now, plan.trial_days);
        let input = CreateSubscription {
            user_id: auth.user_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Trialing,
            current_period_start: now,
            current_period_end: end,
            trial_end: Some(end),
            coupon_id: coupon.as_ref().map(|c| c.id),
        };
        (input, None)
    } else {
        let end = advance_period(now, plan.interval());
        let amounts =
            InvoiceAmounts::compute(plan.price_cents, coupon.as_ref().and_then(Coupon::discount));
        let draft = invoice_draft(
            auth.user_id,
            None,
            &plan,
            format!("Assinatura {}", plan.name),
            amounts,
            (now, end),
            card.as_ref().map(|c| c.id),
        );
        let input = CreateSubscription {
            user_id: auth.user_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: end,
            trial_end: None,
            coupon_id: coupon.as_ref().map(|c| c.id),
        };
        (input, Some(draft))
    };

    // The coupon may have been exhausted since it was checked above.
    let (subscription, invoice) =
        SubscriptionRepo::start(&state.pool, &input, first_invoice.as_ref())
            .await?
            .ok_or_else(|| AppError::field("coupon_code", MSG_COUPON_INVALID))?;

    tracing::info!(
        user_id = auth.user_id,
        subscription_id = subscription.id,
        plan = %plan.code,
        status = %subscription.status,
        "Subscription started"
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubscriptionChange {
                subscription: SubscriptionView { subscription, plan },
                invoice,
            },
        }),
    ))
}

/// POST /api/v1/billing/subscription/change-plan
///
/// Trialing subscriptions switch without charge. Within the same billing
/// interval the difference is prorated over the rest of the period; a switch
/// to another interval restarts the period and credits the unused share of
/// the old price.
pub async fn change_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<ChangePlanForm>,
) -> AppResult<Json<DataResponse<SubscriptionChange>>> {
    forms::validate_form(&form)?;

    let now = Utc::now();
    let current = live_subscription(&state.pool, auth.user_id).await?;
    if current.plan_id == form.plan_id {
        return Err(AppError::field("plan_id", MSG_SAME_PLAN));
    }

    let new_plan = active_plan(&state.pool, form.plan_id).await?;
    let old_plan = PlanRepo::find_by_id(&state.pool, current.plan_id)
        .await?
        .ok_or_else(|| {
            AppError::InternalError(format!("Plan {} of subscription missing", current.plan_id))
        })?;

    let (new_period, draft) = if current.status() == SubscriptionStatus::Trialing {
        (None, None)
    } else {
        let discount = coupon_discount(&state.pool, current.coupon_id).await?;
        let card = default_card(&state.pool, auth.user_id, now).await?;
        let description = format!("Troca de plano: {} para {}", old_plan.name, new_plan.name);

        if old_plan.interval() == new_plan.interval() {
            let charge = prorate_plan_change(
                old_plan.price_cents,
                new_plan.price_cents,
                current.current_period_start,
                current.current_period_end,
                now,
            );
            let amounts = InvoiceAmounts::compute(charge, discount);
            let draft = (amounts.amount_due_cents > 0).then(|| {
                invoice_draft(
                    auth.user_id,
                    Some(current.id),
                    &new_plan,
                    description,
                    amounts,
                    (now, current.current_period_end),
                    card,
                )
            });
            (None, draft)
        } else {
            let end = advance_period(now, new_plan.interval());
            let credit = unused_share(
                old_plan.price_cents,
                current.current_period_start,
                current.current_period_end,
                now,
            );
            let charge = (new_plan.price_cents - credit).max(0);
            let amounts = InvoiceAmounts::compute(charge, discount);
            let draft = invoice_draft(
                auth.user_id,
                Some(current.id),
                &new_plan,
                description,
                amounts,
                (now, end),
                card,
            );
            (Some((now, end)), Some(draft))
        }
    };

    let (subscription, invoice) = SubscriptionRepo::change_plan(
        &state.pool,
        current.id,
        new_plan.id,
        new_period,
        draft.as_ref(),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(MSG_NO_SUBSCRIPTION.into()))?;

    tracing::info!(
        user_id = auth.user_id,
        subscription_id = subscription.id,
        from = %old_plan.code,
        to = %new_plan.code,
        invoiced = invoice.as_ref().map_or(0, |i| i.amount_due_cents),
        "Subscription plan changed"
    );

    Ok(Json(DataResponse {
        data: SubscriptionChange {
            subscription: SubscriptionView {
                subscription,
                plan: new_plan,
            },
            invoice,
        },
    }))
}

/// POST /api/v1/billing/subscription/cancel
///
/// The body is optional; `at_period_end` defaults to `true`.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Option<Json<CancelSubscriptionForm>>,
) -> AppResult<Json<DataResponse<SubscriptionView>>> {
    let form = body.map(|Json(f)| f).unwrap_or_default();
    let current = live_subscription(&state.pool, auth.user_id).await?;

    let updated = if form.at_period_end {
        SubscriptionRepo::set_cancel_at_period_end(&state.pool, current.id, true).await?
    } else {
        SubscriptionRepo::cancel_now(&state.pool, current.id).await?
    };
    let subscription = updated.ok_or_else(|| AppError::NotFound(MSG_NO_SUBSCRIPTION.into()))?;

    tracing::info!(
        user_id = auth.user_id,
        subscription_id = subscription.id,
        at_period_end = form.at_period_end,
        "Subscription canceled"
    );

    let view = subscription_view(&state.pool, subscription).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/billing/subscription/resume
pub async fn resume_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<SubscriptionView>>> {
    let current = live_subscription(&state.pool, auth.user_id).await?;
    if !current.cancel_at_period_end {
        return Err(AppError::BadRequest(MSG_NOTHING_TO_RESUME.into()));
    }

    let subscription = SubscriptionRepo::set_cancel_at_period_end(&state.pool, current.id, false)
        .await?
        .ok_or_else(|| AppError::NotFound(MSG_NO_SUBSCRIPTION.into()))?;

    tracing::info!(user_id = auth.user_id, subscription_id = subscription.id, "Subscription resumed");

    let view = subscription_view(&state.pool, subscription).await?;
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

/// GET /api/v1/billing/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<Invoice>>>> {
    let invoices = InvoiceRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: invoices }))
}

/// GET /api/v1/billing/invoices/{id}
pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Invoice>>> {
    let invoice = InvoiceRepo::find_for_user(&state.pool, id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Invoice",
            id,
        }))?;
    Ok(Json(DataResponse { data: invoice }))
}

/// POST /api/v1/billing/invoices/{id}/pay
///
/// Charges the given card, or the default card when none is named.
pub async fn pay_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<DbId>,
    body: Option<Json<PayInvoiceForm>>,
) -> AppResult<Json<DataResponse<Invoice>>> {
    let form = body.map(|Json(f)| f).unwrap_or_default();
    forms::validate_form(&form)?;

    let invoice = InvoiceRepo::find_for_user(&state.pool, id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Invoice",
            id,
        }))?;
    if invoice.status() != InvoiceStatus::Open {
        return Err(AppError::conflict(MSG_INVOICE_NOT_OPEN));
    }

    let now = Utc::now();
    let card = match form.payment_method_id {
        Some(pm_id) => chargeable_card(&state.pool, pm_id, auth.user_id, now).await?,
        None => PaymentMethodRepo::find_default(&state.pool, auth.user_id)
            .await?
            .ok_or_else(|| AppError::field("payment_method_id", MSG_PAYMENT_METHOD_INVALID))
            .and_then(|card| ensure_not_expired(card, now))?,
    };

    // Lost a race with another payment of the same invoice.
    let paid = InvoiceRepo::mark_paid(&state.pool, id, auth.user_id, card.id)
        .await?
        .ok_or_else(|| AppError::conflict(MSG_INVOICE_NOT_OPEN))?;

    tracing::info!(
        user_id = auth.user_id,
        invoice_id = paid.id,
        amount_cents = paid.amount_due_cents,
        "Invoice paid"
    );
    Ok(Json(DataResponse { data: paid }))
}

// ---------------------------------------------------------------------------
// Payment methods
// ---------------------------------------------------------------------------

/// GET /api/v1/billing/payment-methods
pub async fn list_payment_methods(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<PaymentMethod>>>> {
    let methods = PaymentMethodRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: methods }))
}

/// POST /api/v1/billing/payment-methods
pub async fn add_payment_method(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<AddPaymentMethodForm>,
) -> AppResult<(StatusCode, Json<DataResponse<PaymentMethod>>)> {
    forms::validate_form(&form)?;
    forms::check_card_not_expired(form.exp_year, form.exp_month, Utc::now())?;

    let method = PaymentMethodRepo::create(
        &state.pool,
        &CreatePaymentMethod {
            user_id: auth.user_id,
            brand: form.brand.trim().to_lowercase(),
            last4: form.last4,
            exp_month: form.exp_month,
            exp_year: form.exp_year,
            make_default: form.make_default,
        },
    )
    .await?;

    tracing::info!(user_id = auth.user_id, payment_method_id = method.id, "Payment method added");
    Ok((StatusCode::CREATED, Json(DataResponse { data: method })))
}

/// POST /api/v1/billing/payment-methods/{id}/default
pub async fn set_default_payment_method(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<PaymentMethod>>> {
    let method = PaymentMethodRepo::set_default(&state.pool, id, auth.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "PaymentMethod",
            id,
        }))?;
    Ok(Json(DataResponse { data: method }))
}

/// DELETE /api/v1/billing/payment-methods/{id}
pub async fn delete_payment_method(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if PaymentMethodRepo::delete(&state.pool, id, auth.user_id).await? {
        tracing::info!(user_id = auth.user_id, payment_method_id = id, "Payment method removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "PaymentMethod",
            id,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Summary of the user's live subscription, if any.
pub async fn load_subscription_summary(
    pool: &DbPool,
    user_id: DbId,
) -> AppResult<Option<SubscriptionSummary>> {
    let Some(subscription) = SubscriptionRepo::find_live_for_user(pool, user_id).await? else {
        return Ok(None);
    };
    let Some(plan) = PlanRepo::find_by_id(pool, subscription.plan_id).await? else {
        return Ok(None);
    };

    Ok(Some(SubscriptionSummary {
        id: subscription.id,
        status: subscription.status,
        plan_id: plan.id,
        plan_code: plan.code,
        plan_name: plan.name,
        current_period_end: subscription.current_period_end,
        trial_end: subscription.trial_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
    }))
}

async fn live_subscription(pool: &DbPool, user_id: DbId) -> AppResult<Subscription> {
    SubscriptionRepo::find_live_for_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(MSG_NO_SUBSCRIPTION.into()))
}

async fn subscription_view(pool: &DbPool, subscription: Subscription) -> AppResult<SubscriptionView> {
    let plan = PlanRepo::find_by_id(pool, subscription.plan_id)
        .await?
        .ok_or_else(|| {
            AppError::InternalError(format!(
                "Plan {} of subscription {} missing",
                subscription.plan_id, subscription.id
            ))
        })?;
    Ok(SubscriptionView { subscription, plan })
}

async fn active_plan(pool: &DbPool, plan_id: DbId) -> AppResult<Plan> {
    PlanRepo::find_by_id(pool, plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::field("plan_id", MSG_PLAN_INVALID))
}

/// Look up a coupon that can be redeemed now; failures are reported on `field`.
async fn usable_coupon(pool: &DbPool, code: &str, field: &str) -> AppResult<Coupon> {
    CouponRepo::find_by_code(pool, code)
        .await?
        .filter(|c| c.is_usable(Utc::now()))
        .ok_or_else(|| AppError::field(field, MSG_COUPON_INVALID))
}

/// Discount of the coupon a subscription was started with. Applies for the
/// life of the subscription, even after the coupon itself expires.
async fn coupon_discount(pool: &DbPool, coupon_id: Option<DbId>) -> AppResult<Option<Discount>> {
    let Some(id) = coupon_id else {
        return Ok(None);
    };
    Ok(CouponRepo::find_by_id(pool, id)
        .await?
        .and_then(|c| c.discount()))
}

/// A card of `user_id` that has not expired.
async fn chargeable_card(
    pool: &DbPool,
    id: DbId,
    user_id: DbId,
    now: Timestamp,
) -> AppResult<PaymentMethod> {
    let card = PaymentMethodRepo::find_for_user(pool, id, user_id)
        .await?
        .ok_or_else(|| AppError::field("payment_method_id", MSG_PAYMENT_METHOD_INVALID))?;
    ensure_not_expired(card, now)
}

fn ensure_not_expired(card: PaymentMethod, now: Timestamp) -> AppResult<PaymentMethod> {
    if card.is_valid_on(now) {
        Ok(card)
    } else {
        Err(AppError::field("payment_method_id", MSG_CARD_EXPIRED))
    }
}

/// Id of the user's default card, if it can still be charged.
async fn default_card(pool: &DbPool, user_id: DbId, now: Timestamp) -> AppResult<Option<DbId>> {
    Ok(PaymentMethodRepo::find_default(pool, user_id)
        .await?
        .filter(|c| c.is_valid_on(now))
        .map(|c| c.id))
}

fn invoice_draft(
    user_id: DbId,
    subscription_id: Option<DbId>,
    plan: &Plan,
    description: String,
    amounts: InvoiceAmounts,
    (period_start, period_end): (Timestamp, Timestamp),
    payment_method_id: Option<DbId>,
) -> CreateInvoice {
    CreateInvoice {
        user_id,
        subscription_id,
        plan_id: plan.id,
        description,
        subtotal_cents: amounts.subtotal_cents,
        discount_cents: amounts.discount_cents,
        amount_due_cents: amounts.amount_due_cents,
        currency: plan.currency.clone(),
        period_start,
        period_end,
        due_at: period_start,
        // Nothing to charge on a zero invoice.
        payment_method_id: payment_method_id.filter(|_| amounts.amount_due_cents > 0),
    }
}

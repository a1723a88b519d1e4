//! Route definitions for the `/billing` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::billing;
use crate::state::AppState;

/// Routes mounted at `/billing`.
///
/// ```text
/// GET    /plans                          -> list_plans
/// GET    /plans/{id}                     -> get_plan
/// POST   /coupons/validate               -> validate_coupon
/// GET    /subscription                   -> get_subscription
/// POST   /subscription                   -> subscribe
/// POST   /subscription/change-plan       -> change_plan
/// POST   /subscription/cancel            -> cancel_subscription
/// POST   /subscription/resume            -> resume_subscription
/// GET    /invoices                       -> list_invoices
/// GET    /invoices/{id}                  -> get_invoice
/// POST   /invoices/{id}/pay              -> pay_invoice
/// GET    /payment-methods                -> list_payment_methods
/// POST   /payment-methods                -> add_payment_method
/// DELETE /payment-methods/{id}           -> delete_payment_method
/// POST   /payment-methods/{id}/default   -> set_default_payment_method
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(billing::list_plans))
        .route("/plans/{id}", get(billing::get_plan))
        .route("/coupons/validate", post(billing::validate_coupon))
        .route(
            "/subscription",
            get(billing::get_subscription).post(billing::subscribe),
        )
        .route("/subscription/change-plan", post(billing::change_plan))
        .route("/subscription/cancel", post(billing::cancel_subscription))
        .route("/subscription/resume", post(billing::resume_subscription))
        .route("/invoices", get(billing::list_invoices))
        .route("/invoices/{id}", get(billing::get_invoice))
        .route("/invoices/{id}/pay", post(billing::pay_invoice))
        .route(
            "/payment-methods",
            get(billing::list_payment_methods).post(billing::add_payment_method),
        )
        .route("/payment-methods/{id}", delete(billing::delete_payment_method))
        .route(
            "/payment-methods/{id}/default",
            post(billing::set_default_payment_method),
        )
}

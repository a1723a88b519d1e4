pub mod admin;
pub mod auth;
pub mod billing;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/register, /auth/login, /auth/refresh-token      public
/// /auth/forgot-password, /auth/reset-password           public
/// /auth/verify-email                                    public
/// /auth/me, /auth/logout, /auth/sessions                requires auth
/// /auth/change-password, /auth/revoke-session           requires auth
/// /auth/resend-verification                             requires auth
///
/// /billing/plans, /billing/plans/{id}                   public
/// /billing/coupons/validate                             requires auth
/// /billing/subscription[/change-plan|/cancel|/resume]   requires auth
/// /billing/invoices[/{id}[/pay]]                        requires auth
/// /billing/payment-methods[/{id}[/default]]             requires auth
///
/// /admin/plans, /admin/plans/{id}, /admin/coupons       admin only
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/billing", billing::router())
        .nest("/admin", admin::router())
}

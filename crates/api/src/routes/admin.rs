//! Route definitions for the `/admin` resource. Every handler requires the
//! `admin` role via [`RequireAdmin`](crate::middleware::rbac::RequireAdmin).

use axum::routing::{post, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// POST /plans        -> create_plan
/// PUT  /plans/{id}   -> update_plan
/// POST /coupons      -> create_coupon
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", post(admin::create_plan))
        .route("/plans/{id}", put(admin::update_plan))
        .route("/coupons", post(admin::create_coupon))
}

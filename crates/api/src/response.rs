//! Shared response envelope types for API handlers.
//!
//! Billing and admin resources respond with a `{ "data": ... }` envelope.
//! Auth endpoints return their payload bare.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: plans }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// `{ "message": ... }` body for accepted-but-asynchronous actions.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

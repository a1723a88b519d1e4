//! Route definitions for the `/auth` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /register             -> register
/// POST /login                -> login
/// GET  /me                   -> me (requires auth)
/// POST /logout               -> logout (requires auth)
/// POST /refresh-token        -> refresh_token
/// POST /forgot-password      -> forgot_password
/// POST /reset-password       -> reset_password
/// POST /change-password      -> change_password (requires auth)
/// POST /revoke-session       -> revoke_session (requires auth)
/// GET  /sessions             -> list_sessions (requires auth)
/// POST /verify-email         -> verify_email
/// POST /resend-verification  -> resend_verification (requires auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/refresh-token", post(auth::refresh_token))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/change-password", post(auth::change_password))
        .route("/revoke-session", post(auth::revoke_session))
        .route("/sessions", get(auth::list_sessions))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
}

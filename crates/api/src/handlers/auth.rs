//! Handlers for the `/auth` resource.
//!
//! Access tokens are short-lived JWTs bound to a `user_sessions` row; refresh
//! tokens are opaque, stored hashed, and rotated on every use.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use vitrine_core::error::CoreError;
use vitrine_core::forms::{
    self, ChangePasswordForm, ForgotPasswordForm, LoginForm, RefreshTokenForm, RegisterForm,
    ResetPasswordForm, RevokeSessionForm, VerifyEmailForm, MSG_CURRENT_PASSWORD_WRONG,
    MSG_PASSWORD_UNCHANGED, MSG_TOKEN_INVALID,
};
use vitrine_core::roles::ROLE_USER;
use vitrine_core::types::{DbId, Timestamp};
use vitrine_core::tokens::{
    generate_opaque_token, hash_token, EMAIL_VERIFICATION_TTL_HOURS, PASSWORD_RESET_TTL_MINS,
    PURPOSE_EMAIL_VERIFICATION, PURPOSE_PASSWORD_RESET,
};
use vitrine_db::models::session::{CreateSession, SessionResponse};
use vitrine_db::models::user::{CreateUser, User, UserResponse};
use vitrine_db::models::user_token::CreateUserToken;
use vitrine_db::repositories::{RoleRepo, SessionRepo, UserRepo, UserTokenRepo};

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{burn_verification, hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::handlers::billing::{load_subscription_summary, SubscriptionSummary};
use crate::mail;
use crate::middleware::auth::AuthUser;
use crate::middleware::client_info::ClientInfo;
use crate::response::{DataResponse, MessageResponse};
use crate::state::AppState;

/// Maximum consecutive failed login attempts before locking the account.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Duration in minutes to lock an account after exceeding failed attempts.
pub const LOCK_DURATION_MINS: i64 = 15;

const MSG_BAD_CREDENTIALS: &str = "E-mail ou senha inválidos";
const MSG_ACCOUNT_INACTIVE: &str = "Conta desativada";
const MSG_ACCOUNT_LOCKED: &str =
    "Conta bloqueada temporariamente por excesso de tentativas. Tente novamente mais tarde.";
const MSG_EMAIL_TAKEN: &str = "Este e-mail já está cadastrado";
const MSG_EMAIL_ALREADY_VERIFIED: &str = "O e-mail já foi confirmado";
const MSG_RESET_REQUESTED: &str =
    "Se o e-mail estiver cadastrado, você receberá as instruções para redefinir a senha.";
const MSG_VERIFICATION_SENT: &str = "Enviamos um novo link de confirmação para o seu e-mail.";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Successful authentication response returned by register, login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Body of `GET /auth/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub subscription: Option<SubscriptionSummary>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create an account with the `user` role, open a session and send the
/// email verification link.
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(form): Json<RegisterForm>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let form = form.normalized();
    forms::validate_form(&form)?;

    if UserRepo::email_exists(&state.pool, &form.email).await? {
        return Err(AppError::conflict(MSG_EMAIL_TAKEN));
    }

    let role = RoleRepo::find_by_name(&state.pool, ROLE_USER)
        .await?
        .ok_or_else(|| AppError::InternalError(format!("Role '{ROLE_USER}' is not seeded")))?;

    let password_hash = hash_password(&form.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    // The unique index still guards a concurrent duplicate; it surfaces as 409.
    let user = UserRepo::create(
        &state.pool,
        &CreateUser {
            name: form.name,
            email: form.email,
            password_hash,
            role_id: role.id,
        },
    )
    .await?;

    tracing::info!(user_id = user.id, "User registered");

    send_verification_email(&state, &user).await?;

    let response = create_auth_response(&state, &user, role.name, client).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
///
/// Authenticate with email + password. Returns access and refresh tokens.
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(form): Json<LoginForm>,
) -> AppResult<Json<AuthResponse>> {
    let form = form.normalized();
    forms::validate_form(&form)?;

    // 1. Find user by email.
    let Some(user) = UserRepo::find_by_email(&state.pool, &form.email).await? else {
        burn_verification(&form.password);
        return Err(AppError::unauthorized(MSG_BAD_CREDENTIALS));
    };

    // 2. Check if the account is active.
    if !user.is_active {
        return Err(AppError::forbidden(MSG_ACCOUNT_INACTIVE));
    }

    // 3. Check if the account is temporarily locked.
    let now = Utc::now();
    if user.is_locked(now) {
        return Err(AppError::forbidden(MSG_ACCOUNT_LOCKED));
    }

    // 4. Verify password.
    let password_valid = verify_password(&form.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        // 5. On failure: increment counter, lock if threshold reached.
        let failures = UserRepo::increment_failed_login(&state.pool, user.id).await?;
        if failures >= MAX_FAILED_ATTEMPTS {
            let lock_until = now + chrono::Duration::minutes(LOCK_DURATION_MINS);
            UserRepo::lock_account(&state.pool, user.id, lock_until).await?;
            tracing::warn!(user_id = user.id, failures, "Account locked after failed logins");
        }
        return Err(AppError::unauthorized(MSG_BAD_CREDENTIALS));
    }

    // 6. On success: reset failed count, set last_login_at.
    UserRepo::record_successful_login(&state.pool, user.id).await?;

    let role = RoleRepo::resolve_name(&state.pool, user.role_id).await?;
    let response = create_auth_response(&state, &user, role, client).await?;

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(response))
}

/// GET /api/v1/auth/me
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MeResponse>> {
    let user = find_user(&state, auth.user_id).await?;
    SessionRepo::touch(&state.pool, auth.session_id).await?;

    let role = RoleRepo::resolve_name(&state.pool, user.role_id).await?;
    let subscription = load_subscription_summary(&state.pool, user.id).await?;

    Ok(Json(MeResponse {
        user: UserResponse::from_user(&user, role),
        subscription,
    }))
}

/// POST /api/v1/auth/logout
///
/// Revoke the session the access token belongs to. Other devices stay
/// signed in. Returns 204 No Content.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    SessionRepo::revoke_for_user(&state.pool, auth.session_id, auth.user_id).await?;
    tracing::info!(user_id = auth.user_id, session_id = auth.session_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/refresh-token
///
/// Exchange a refresh token for a new access + refresh token pair. The
/// presented token is retired; presenting a retired token again revokes
/// every session of its owner.
pub async fn refresh_token(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(form): Json<RefreshTokenForm>,
) -> AppResult<Json<AuthResponse>> {
    forms::validate_form(&form)?;

    let token_hash = hash_token(&form.refresh_token);
    let session = SessionRepo::find_by_refresh_token_hash(&state.pool, &token_hash)
        .await?
        .ok_or_else(|| AppError::unauthorized(MSG_TOKEN_INVALID))?;

    // A revoked token coming back, whether rotated away or logged out,
    // ends every session of its owner.
    if session.is_revoked {
        let revoked = SessionRepo::revoke_all_for_user(&state.pool, session.user_id).await?;
        tracing::warn!(
            user_id = session.user_id,
            session_id = session.id,
            rotated = session.was_rotated(),
            revoked,
            "Refresh token reuse detected; all sessions revoked"
        );
        return Err(AppError::unauthorized(MSG_TOKEN_INVALID));
    }

    if session.expires_at <= Utc::now() {
        return Err(AppError::unauthorized(MSG_TOKEN_INVALID));
    }

    let user = find_user(&state, session.user_id).await?;
    if !user.is_active {
        SessionRepo::revoke_all_for_user(&state.pool, user.id).await?;
        return Err(AppError::forbidden(MSG_ACCOUNT_INACTIVE));
    }

    let refresh = generate_opaque_token();
    let input = CreateSession {
        user_id: user.id,
        refresh_token_hash: refresh.hash,
        expires_at: refresh_expiry(&state),
        user_agent: client.user_agent.or(session.user_agent),
        ip_address: client.ip_address.or(session.ip_address),
    };

    // A concurrent refresh with the same token already won the rotation.
    let new_session = SessionRepo::rotate(&state.pool, session.id, &input)
        .await?
        .ok_or_else(|| AppError::unauthorized(MSG_TOKEN_INVALID))?;

    let role = RoleRepo::resolve_name(&state.pool, user.role_id).await?;
    let response = build_auth_response(&state, &user, role, new_session.id, refresh.plaintext)?;
    Ok(Json(response))
}

/// POST /api/v1/auth/forgot-password
///
/// Always answers 202 with the same message so the endpoint cannot be used
/// to discover which emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(form): Json<ForgotPasswordForm>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let form = form.normalized();
    forms::validate_form(&form)?;

    match UserRepo::find_by_email(&state.pool, &form.email).await? {
        Some(user) if user.is_active => {
            let token = generate_opaque_token();
            UserTokenRepo::issue(
                &state.pool,
                &CreateUserToken {
                    user_id: user.id,
                    purpose: PURPOSE_PASSWORD_RESET,
                    token_hash: token.hash,
                    expires_at: Utc::now() + chrono::Duration::minutes(PASSWORD_RESET_TTL_MINS),
                },
            )
            .await?;

            state.mailer.send(mail::password_reset_email(
                &state.config.app_base_url,
                &user.email,
                &user.name,
                &token.plaintext,
            ));
            tracing::info!(user_id = user.id, "Password reset requested");
        }
        _ => tracing::debug!("Password reset requested for unknown or inactive account"),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: MSG_RESET_REQUESTED,
        }),
    ))
}

/// POST /api/v1/auth/reset-password
///
/// Consume a reset token, set the new password and sign out every session.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(form): Json<ResetPasswordForm>,
) -> AppResult<StatusCode> {
    forms::validate_form(&form)?;

    let user_id = UserTokenRepo::consume(
        &state.pool,
        PURPOSE_PASSWORD_RESET,
        &hash_token(&form.token),
    )
    .await?
    .ok_or_else(|| AppError::field("token", MSG_TOKEN_INVALID))?;

    let password_hash = hash_password(&form.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    UserRepo::update_password(&state.pool, user_id, &password_hash).await?;
    let revoked = SessionRepo::revoke_all_for_user(&state.pool, user_id).await?;

    tracing::info!(user_id, revoked, "Password reset completed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/change-password
///
/// Requires the current password. Every other session is signed out; the
/// calling session stays valid.
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<ChangePasswordForm>,
) -> AppResult<StatusCode> {
    forms::validate_form(&form)?;

    if form.new_password == form.current_password {
        return Err(AppError::field("new_password", MSG_PASSWORD_UNCHANGED));
    }

    let user = find_user(&state, auth.user_id).await?;
    let current_ok = verify_password(&form.current_password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !current_ok {
        return Err(AppError::field("current_password", MSG_CURRENT_PASSWORD_WRONG));
    }

    let password_hash = hash_password(&form.new_password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    UserRepo::update_password(&state.pool, user.id, &password_hash).await?;
    let revoked =
        SessionRepo::revoke_all_except(&state.pool, user.id, auth.session_id).await?;

    tracing::info!(user_id = user.id, revoked, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/revoke-session
pub async fn revoke_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<RevokeSessionForm>,
) -> AppResult<StatusCode> {
    forms::validate_form(&form)?;

    let revoked = SessionRepo::revoke_for_user(&state.pool, form.session_id, auth.user_id).await?;
    if !revoked {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Session",
            id: form.session_id,
        }));
    }

    tracing::info!(user_id = auth.user_id, session_id = form.session_id, "Session revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<SessionResponse>>>> {
    let sessions = SessionRepo::list_active_for_user(&state.pool, auth.user_id).await?;
    let data = sessions
        .iter()
        .map(|s| SessionResponse::from_session(s, auth.session_id))
        .collect();
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(form): Json<VerifyEmailForm>,
) -> AppResult<StatusCode> {
    forms::validate_form(&form)?;

    let user_id = UserTokenRepo::consume(
        &state.pool,
        PURPOSE_EMAIL_VERIFICATION,
        &hash_token(&form.token),
    )
    .await?
    .ok_or_else(|| AppError::field("token", MSG_TOKEN_INVALID))?;

    UserRepo::mark_email_verified(&state.pool, user_id).await?;
    tracing::info!(user_id, "Email verified");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/resend-verification
pub async fn resend_verification(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let user = find_user(&state, auth.user_id).await?;
    if user.email_verified_at.is_some() {
        return Err(AppError::conflict(MSG_EMAIL_ALREADY_VERIFIED));
    }

    send_verification_email(&state, &user).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: MSG_VERIFICATION_SENT,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_user(state: &AppState, user_id: DbId) -> AppResult<User> {
    UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User no longer exists"))
}

fn refresh_expiry(state: &AppState) -> Timestamp {
    Utc::now() + chrono::Duration::days(state.config.jwt.refresh_token_expiry_days)
}

/// Store a fresh verification token and mail its link.
async fn send_verification_email(state: &AppState, user: &User) -> AppResult<()> {
    let token = generate_opaque_token();
    UserTokenRepo::issue(
        &state.pool,
        &CreateUserToken {
            user_id: user.id,
            purpose: PURPOSE_EMAIL_VERIFICATION,
            token_hash: token.hash,
            expires_at: Utc::now() + chrono::Duration::hours(EMAIL_VERIFICATION_TTL_HOURS),
        },
    )
    .await?;

    state.mailer.send(mail::verification_email(
        &state.config.app_base_url,
        &user.email,
        &user.name,
        &token.plaintext,
    ));
    Ok(())
}

/// Persist a new session row and build the token response for it.
async fn create_auth_response(
    state: &AppState,
    user: &User,
    role: String,
    client: ClientInfo,
) -> AppResult<AuthResponse> {
    let refresh = generate_opaque_token();
    let session = SessionRepo::create(
        &state.pool,
        &CreateSession {
            user_id: user.id,
            refresh_token_hash: refresh.hash,
            expires_at: refresh_expiry(state),
            user_agent: client.user_agent,
            ip_address: client.ip_address,
        },
    )
    .await?;

    build_auth_response(state, user, role, session.id, refresh.plaintext)
}

fn build_auth_response(
    state: &AppState,
    user: &User,
    role: String,
    session_id: DbId,
    refresh_token: String,
) -> AppResult<AuthResponse> {
    let access_token = generate_access_token(user.id, &role, session_id, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    Ok(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.config.jwt.access_token_expiry_secs(),
        user: UserResponse::from_user(user, role),
    })
}

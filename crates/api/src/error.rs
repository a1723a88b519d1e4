use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vitrine_core::error::{CoreError, FieldError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `vitrine_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A missing resource that has no numeric id (e.g. "no subscription").
    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Core(CoreError::Unauthorized(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Core(CoreError::Forbidden(msg.into()))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Core(CoreError::Conflict(msg.into()))
    }

    pub fn field(field: &str, msg: &str) -> Self {
        AppError::Core(CoreError::field(field, msg))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::InvalidFields(errors) => return invalid_fields_response(errors),
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 400 with a per-field message map: `{"fields": {"email": ["..."]}}`.
fn invalid_fields_response(errors: &[FieldError]) -> Response {
    let mut fields: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for e in errors {
        fields.entry(&e.field).or_default().push(&e.message);
    }

    let message = errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "Dados inválidos".to_string());

    let body = json!({
        "error": message,
        "code": "VALIDATION_ERROR",
        "fields": fields,
    });

    (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Map a sqlx error onto a response triple.
///
/// Unique and check violations on known constraints surface as 409 and 400
/// with a readable message; anything else is logged and sanitized.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    let db_err = match err {
        sqlx::Error::RowNotFound => {
            return (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Recurso não encontrado".to_string(),
            )
        }
        sqlx::Error::Database(db_err) => db_err,
        other => {
            tracing::error!(error = %other, "Database error");
            return internal();
        }
    };

    let constraint = db_err.constraint().unwrap_or_default();
    match (db_err.code().as_deref(), constraint_message(constraint)) {
        (Some(PG_UNIQUE_VIOLATION), Some(msg)) => {
            (StatusCode::CONFLICT, "CONFLICT", msg.to_string())
        }
        (Some(PG_CHECK_VIOLATION), Some(msg)) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.to_string())
        }
        _ => {
            tracing::error!(error = %db_err, constraint, "Database error");
            internal()
        }
    }
}

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_CHECK_VIOLATION: &str = "23514";

fn constraint_message(constraint: &str) -> Option<&'static str> {
    Some(match constraint {
        "uq_users_email" => "Este e-mail já está cadastrado",
        "uq_plans_code" => "Já existe um plano com este código",
        "uq_coupons_code" => "Já existe um cupom com este código",
        "uq_subscriptions_live_per_user" => "Você já possui uma assinatura ativa",
        "uq_payment_methods_default" => "Outro cartão foi definido como padrão ao mesmo tempo",
        "ck_coupons_single_discount" => "Informe apenas um tipo de desconto",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constraints_have_messages() {
        assert_eq!(
            constraint_message("uq_users_email"),
            Some("Este e-mail já está cadastrado")
        );
        assert_eq!(
            constraint_message("uq_payment_methods_default"),
            Some("Outro cartão foi definido como padrão ao mesmo tempo")
        );
        assert!(constraint_message("uq_invoices_number").is_none());
        assert!(constraint_message("").is_none());
    }
}

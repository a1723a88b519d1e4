//! Tests for the `AppError` to HTTP response mapping.

use assert_matches::assert_matches;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use serde_json::Value;
use vitrine_api::error::AppError;
use vitrine_core::error::{CoreError, FieldError};

async fn into_parts(error: AppError) -> (StatusCode, Value) {
    let response = error.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn not_found_includes_entity_and_id() {
    let (status, json) = into_parts(AppError::Core(CoreError::NotFound {
        entity: "Plan",
        id: 42,
    }))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Plan with id 42 not found");
}

#[tokio::test]
async fn invalid_fields_group_messages_per_field() {
    let error = AppError::Core(CoreError::InvalidFields(vec![
        FieldError::new("password", "A senha deve conter letras e números"),
        FieldError::new("email", "Informe um e-mail válido"),
        FieldError::new("password", "A senha deve ter entre 8 e 128 caracteres"),
    ]));
    let (status, json) = into_parts(error).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "A senha deve conter letras e números");
    assert_eq!(json["fields"]["email"].as_array().unwrap().len(), 1);
    assert_eq!(json["fields"]["password"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn field_helper_builds_single_field_error() {
    let error = AppError::field("coupon_code", "Cupom inválido ou expirado");
    assert_matches!(&error, AppError::Core(CoreError::InvalidFields(errors)) if errors.len() == 1);

    let (status, json) = into_parts(error).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["fields"]["coupon_code"][0], "Cupom inválido ou expirado");
}

#[tokio::test]
async fn auth_errors_map_to_401_and_403() {
    let (status, json) = into_parts(AppError::unauthorized("Missing token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
    assert_eq!(json["error"], "Missing token");

    let (status, json) = into_parts(AppError::forbidden("Admin role required")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn conflict_maps_to_409() {
    let (status, json) = into_parts(AppError::conflict("Este e-mail já está cadastrado")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn row_not_found_maps_to_404() {
    let (status, json) = into_parts(AppError::Database(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn internal_errors_do_not_leak_details() {
    let (status, json) =
        into_parts(AppError::InternalError("connection string postgres://secret".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");

    let (status, json) = into_parts(AppError::Core(CoreError::Internal("boom".into()))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");

    let (status, _) = into_parts(AppError::Database(sqlx::Error::PoolTimedOut)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn bad_request_and_plain_not_found_keep_their_message() {
    let (status, json) = into_parts(AppError::BadRequest("Nada a retomar".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "Nada a retomar");

    let (status, json) = into_parts(AppError::NotFound("Nenhuma assinatura ativa".into())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Nenhuma assinatura ativa");
}

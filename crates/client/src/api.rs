//! REST client for the `/api/v1/auth` endpoints.
//!
//! Wraps the session-related calls (register, login, me, logout, refresh)
//! using [`reqwest`]. Error bodies of the form
//! `{"error", "code", "fields"}` are decoded into [`ClientError::Api`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// The signed-in user as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Short description of the user's live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionSummary {
    pub id: i64,
    pub status: String,
    pub plan_id: i64,
    pub plan_code: String,
    pub plan_name: String,
    pub current_period_end: DateTime<Utc>,
    #[serde(default)]
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Tokens and profile returned by register, login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: User,
}

/// Body of `GET /auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    pub user: User,
    #[serde(default)]
    pub subscription: Option<SubscriptionSummary>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, Vec<String>>,
}

/// HTTP client for one Vitrine API deployment.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the API at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/v1/auth/register`
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/auth/login`
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .client
            .post(self.url("/login"))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/v1/auth/me`
    pub async fn me(&self, access_token: &str) -> Result<MeResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/me"))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/auth/logout`. Ends only the session the token belongs to.
    pub async fn logout(&self, access_token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/logout"))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `POST /api/v1/auth/refresh-token`. The presented refresh token is
    /// retired by the server; use the returned pair from now on.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, ClientError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .client
            .post(self.url("/refresh-token"))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/auth{}", self.base_url, path)
    }

    /// Return the response unchanged on a 2xx status, otherwise decode the
    /// error body into [`ClientError::Api`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ClientError::Api {
                status: status.as_u16(),
                code: body.code,
                message: body.error,
                fields: body.fields,
            },
            Err(_) => ClientError::Api {
                status: status.as_u16(),
                code: None,
                message: if text.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    text
                },
                fields: BTreeMap::new(),
            },
        };
        Err(err)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ClientError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

//! Client metadata recorded on sessions.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::HeaderMap;

/// Longest user agent string stored on a session.
const MAX_USER_AGENT_LEN: usize = 512;

/// User agent and best-effort client IP of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self::from_headers(&parts.headers, peer))
    }
}

impl ClientInfo {
    /// Proxy headers win over the socket peer address: `x-forwarded-for`
    /// (first hop), then `x-real-ip`.
    pub fn from_headers(headers: &HeaderMap, peer: Option<String>) -> Self {
        let user_agent = header_str(headers, USER_AGENT.as_str())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded
            .or_else(|| header_str(headers, "x-real-ip").map(|v| v.trim().to_string()))
            .or(peer);

        Self {
            user_agent,
            ip_address,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

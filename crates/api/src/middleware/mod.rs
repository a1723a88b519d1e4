//! Request extractors used by handlers.
//!
//! - [`auth::AuthUser`] -- Authenticated user from a JWT Bearer token, bound to a live session.
//! - [`rbac::RequireAdmin`] -- Requires the `admin` role.
//! - [`client_info::ClientInfo`] -- User agent and client IP recorded on new sessions.

pub mod auth;
pub mod client_info;
pub mod rbac;

//! Client side of the Vitrine auth API.
//!
//! [`ApiClient`] wraps the REST endpoints. [`SessionManager`] keeps the
//! signed-in user and tokens in memory and persists the tokens through a
//! [`TokenStore`].

pub mod api;
pub mod error;
pub mod session;
pub mod store;

pub use api::{ApiClient, AuthResponse, MeResponse, RegisterRequest, User};
pub use error::ClientError;
pub use session::{SessionManager, SessionState};
pub use store::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore};

//! Client-side session lifecycle.
//!
//! [`SessionManager`] owns the current [`SessionState`] and keeps the token
//! store in step with it. A session that cannot be confirmed against the
//! API is dropped both in memory and in the store.

use tokio::sync::RwLock;

use crate::api::{ApiClient, AuthResponse, RegisterRequest, User};
use crate::error::ClientError;
use crate::store::{StoredTokens, TokenStore};

/// What the client currently knows about its session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated { user: User, tokens: StoredTokens },
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            SessionState::Anonymous => None,
        }
    }

    pub fn tokens(&self) -> Option<&StoredTokens> {
        match self {
            SessionState::Authenticated { tokens, .. } => Some(tokens),
            SessionState::Anonymous => None,
        }
    }
}

/// Session manager over an [`ApiClient`] and a [`TokenStore`].
pub struct SessionManager<S: TokenStore> {
    api: ApiClient,
    store: S,
    state: RwLock<SessionState>,
}

impl<S: TokenStore> SessionManager<S> {
    /// Start anonymous; call [`load`](Self::load) to restore a stored session.
    pub fn new(api: ApiClient, store: S) -> Self {
        Self {
            api,
            store,
            state: RwLock::new(SessionState::Anonymous),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user().cloned()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .tokens()
            .map(|t| t.access_token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Authenticated { .. })
    }

    /// Restore the stored session by asking the API who the token belongs to.
    ///
    /// Returns the user when the stored token is accepted. Any failure
    /// (unreadable store, rejected token, unreachable server) clears both
    /// the store and the in-memory state and yields `None`.
    pub async fn load(&self) -> Option<User> {
        let mut state = self.state.write().await;

        let tokens = match self.store.load().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                *state = SessionState::Anonymous;
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored session unreadable; clearing");
                self.reset(&mut state).await;
                return None;
            }
        };

        match self.api.me(&tokens.access_token).await {
            Ok(me) => {
                let user = me.user;
                *state = SessionState::Authenticated {
                    user: user.clone(),
                    tokens,
                };
                tracing::debug!(user_id = user.id, "Session restored");
                Some(user)
            }
            Err(e) => {
                tracing::info!(error = %e, "Stored session rejected; clearing");
                self.reset(&mut state).await;
                None
            }
        }
    }

    /// Sign in and persist the new session.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let response = self.api.login(email, password).await?;
        self.establish(response).await
    }

    /// Create an account; the API signs the new user in straight away.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ClientError> {
        let response = self.api.register(request).await?;
        self.establish(response).await
    }

    /// Sign out. The API call is best effort; local state is always cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let mut state = self.state.write().await;

        if let Some(tokens) = state.tokens() {
            if let Err(e) = self.api.logout(&tokens.access_token).await {
                tracing::warn!(error = %e, "Logout request failed; clearing local session anyway");
            }
        }

        *state = SessionState::Anonymous;
        self.store.clear().await
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// The write lock is held across the request so two callers never
    /// present the same refresh token; the server treats a replayed token
    /// as stolen. On failure the session is cleared.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let mut state = self.state.write().await;

        let refresh_token = state
            .tokens()
            .map(|t| t.refresh_token.clone())
            .ok_or(ClientError::NotAuthenticated)?;

        match self.api.refresh_token(&refresh_token).await {
            Ok(response) => {
                let tokens = StoredTokens {
                    access_token: response.access_token,
                    refresh_token: response.refresh_token,
                };
                self.store.save(&tokens).await?;
                *state = SessionState::Authenticated {
                    user: response.user,
                    tokens,
                };
                Ok(())
            }
            Err(e) => {
                tracing::info!(error = %e, "Token refresh failed; clearing session");
                self.reset(&mut state).await;
                Err(e)
            }
        }
    }

    // ---- private helpers ----

    async fn establish(&self, response: AuthResponse) -> Result<User, ClientError> {
        let tokens = StoredTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        };
        let mut state = self.state.write().await;
        self.store.save(&tokens).await?;
        *state = SessionState::Authenticated {
            user: response.user.clone(),
            tokens,
        };
        Ok(response.user)
    }

    async fn reset(&self, state: &mut SessionState) {
        *state = SessionState::Anonymous;
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear token store");
        }
    }
}

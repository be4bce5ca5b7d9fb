use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::jwt::TokenIssuer;
use crate::store::{SessionLookup, Store, User};

/// Session handed back to the caller after login, registration or OAuth.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Creates, validates and revokes persisted sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    tokens: TokenIssuer,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, tokens: TokenIssuer) -> Self {
        Self { store, tokens }
    }

    pub async fn create_user_session(&self, user: &User) -> anyhow::Result<IssuedSession> {
        let issued = self.tokens.issue(user)?;
        anyhow::ensure!(
            issued.expires_at > OffsetDateTime::now_utc(),
            "session would expire before it is created"
        );
        let session = self
            .store
            .create_session(user.id, &issued.token, issued.expires_at)
            .await
            .context("persist session")?;
        info!(user_id = user.id, session_id = session.id, "session created");
        Ok(IssuedSession {
            token: issued.token,
            expires_at: session.expires_at,
        })
    }

    /// The session's owner, or `None` for anything that is not a live session.
    pub async fn validate_session(&self, token: &str) -> Option<User> {
        let session = match self.store.get_session_by_token(token).await {
            Ok(SessionLookup::Active(s)) => s,
            Ok(SessionLookup::Expired(s)) => {
                debug!(session_id = s.id, user_id = s.user_id, "session expired");
                return None;
            }
            Ok(SessionLookup::Missing) => {
                debug!("no session for token");
                return None;
            }
            Err(e) => {
                error!(error = %e, "session lookup failed");
                return None;
            }
        };

        let claims = self.tokens.verify(token)?;
        if claims.user_id() != Some(session.user_id) {
            warn!(session_id = session.id, "token subject does not match session owner");
            return None;
        }

        // A dangling session is left in place; it expires on its own.
        let user = match self.store.get_user(session.user_id).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                warn!(session_id = session.id, user_id = session.user_id, "session owner missing");
                return None;
            }
            Err(e) => {
                error!(error = %e, "user lookup failed");
                return None;
            }
        };

        if !user.is_active {
            debug!(user_id = user.id, "session owner is inactive");
            return None;
        }
        Some(user)
    }

    pub async fn destroy_session(&self, token: &str) {
        match self.store.delete_session(token).await {
            Ok(true) => info!("session destroyed"),
            Ok(false) => debug!("logout for unknown session"),
            Err(e) => error!(error = %e, "session delete failed"),
        }
    }

    pub async fn destroy_all_sessions(&self, user_id: i32) -> anyhow::Result<u64> {
        let removed = self
            .store
            .delete_user_sessions(user_id)
            .await
            .context("delete user sessions")?;
        info!(user_id, removed, "all sessions destroyed");
        Ok(removed)
    }
}

//! Credential and timeline storage.
//!
//! [`Store`] is implemented by [`MemoryStore`] and [`PgStore`]; which one runs
//! is decided by configuration at startup.

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use crate::auth::password::PasswordHasher;

mod memory;
mod postgres;
mod types;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use types::{
    NewTimelineItem, NewUser, Session, SessionLookup, TimelineCategory, TimelineItem,
    TimelineItemUpdate, User, UserUpdate,
};

/// Column that a write collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
    ExternalId,
    SessionToken,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UniqueField::Email => "email",
            UniqueField::Username => "username",
            UniqueField::ExternalId => "external identity",
            UniqueField::SessionToken => "session token",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(UniqueField),

    #[error("a user needs a password or an external identity")]
    MissingCredential,

    #[error("no user with id {0}")]
    UnknownUser(i32),

    #[error("unreadable stored record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: i32, update: UserUpdate) -> StoreResult<Option<User>>;

    async fn create_session(
        &self,
        user_id: i32,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session>;
    /// Expired sessions are deleted here and reported as [`SessionLookup::Expired`].
    async fn get_session_by_token(&self, token: &str) -> StoreResult<SessionLookup>;
    /// Returns whether a session was removed.
    async fn delete_session(&self, token: &str) -> StoreResult<bool>;
    async fn delete_user_sessions(&self, user_id: i32) -> StoreResult<u64>;

    /// All items, oldest `date` first.
    async fn get_timeline_items(&self) -> StoreResult<Vec<TimelineItem>>;
    async fn get_timeline_item(&self, id: i32) -> StoreResult<Option<TimelineItem>>;
    async fn create_timeline_item(&self, item: NewTimelineItem) -> StoreResult<TimelineItem>;
    async fn update_timeline_item(
        &self,
        id: i32,
        update: TimelineItemUpdate,
    ) -> StoreResult<Option<TimelineItem>>;
    async fn delete_timeline_item(&self, id: i32) -> StoreResult<bool>;

    /// Look up by email, then username, and check the password.
    async fn validate_password(
        &self,
        hasher: &PasswordHasher,
        email_or_username: &str,
        plain: &str,
    ) -> StoreResult<Option<User>> {
        let user = match self.get_user_by_email(email_or_username).await? {
            Some(u) => Some(u),
            None => self.get_user_by_username(email_or_username).await?,
        };

        let Some(user) = user else {
            hasher.verify_dummy(plain);
            debug!("no account for login identifier");
            return Ok(None);
        };

        let Some(hash) = user.password.as_deref() else {
            hasher.verify_dummy(plain);
            debug!(user_id = user.id, "account has no local password");
            return Ok(None);
        };

        if hasher.verify(plain, hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    NewTimelineItem, NewUser, Session, SessionLookup, Store, StoreError, StoreResult,
    TimelineItem, TimelineItemUpdate, UniqueField, User, UserUpdate,
};

#[derive(Default)]
struct Tables {
    users: HashMap<i32, User>,
    sessions: HashMap<String, Session>,
    timeline: HashMap<i32, TimelineItem>,
    next_user_id: i32,
    next_session_id: i32,
    next_item_id: i32,
}

impl Tables {
    fn next_id(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }

    /// First unique field that `candidate` would collide on, ignoring user `skip`.
    fn user_conflict(
        &self,
        skip: Option<i32>,
        email: Option<&str>,
        username: Option<&str>,
        zitadel_id: Option<&str>,
    ) -> Option<UniqueField> {
        self.users
            .values()
            .filter(|u| Some(u.id) != skip)
            .find_map(|u| {
                if email == Some(u.email.as_str()) {
                    Some(UniqueField::Email)
                } else if username == Some(u.username.as_str()) {
                    Some(UniqueField::Username)
                } else if zitadel_id.is_some() && zitadel_id == u.zitadel_id.as_deref() {
                    Some(UniqueField::ExternalId)
                } else {
                    None
                }
            })
    }
}

/// Process-local store. Uniqueness checks and inserts happen under one write lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t
            .users
            .values()
            .find(|u| u.zitadel_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        if !new.has_credential() {
            return Err(StoreError::MissingCredential);
        }
        let mut t = self.tables.write().await;
        if let Some(field) = t.user_conflict(
            None,
            Some(&new.email),
            Some(&new.username),
            new.zitadel_id.as_deref(),
        ) {
            return Err(StoreError::Conflict(field));
        }

        let id = Tables::next_id(&mut t.next_user_id);
        let user = User {
            id,
            email: new.email,
            username: new.username,
            password: new.password,
            zitadel_id: new.zitadel_id,
            first_name: new.first_name,
            last_name: new.last_name,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: i32, update: UserUpdate) -> StoreResult<Option<User>> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(field) = t.user_conflict(
            Some(id),
            update.email.as_deref(),
            update.username.as_deref(),
            update.zitadel_id.as_deref(),
        ) {
            return Err(StoreError::Conflict(field));
        }

        let Some(user) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = update.email {
            user.email = v;
        }
        if let Some(v) = update.username {
            user.username = v;
        }
        if let Some(v) = update.password {
            user.password = Some(v);
        }
        if let Some(v) = update.zitadel_id {
            user.zitadel_id = Some(v);
        }
        if let Some(v) = update.first_name {
            user.first_name = Some(v);
        }
        if let Some(v) = update.last_name {
            user.last_name = Some(v);
        }
        if let Some(v) = update.is_active {
            user.is_active = v;
        }
        Ok(Some(user.clone()))
    }

    async fn create_session(
        &self,
        user_id: i32,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::UnknownUser(user_id));
        }
        if t.sessions.contains_key(token) {
            return Err(StoreError::Conflict(UniqueField::SessionToken));
        }
        let session = Session {
            id: Tables::next_id(&mut t.next_session_id),
            user_id,
            token: token.to_string(),
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        t.sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn get_session_by_token(&self, token: &str) -> StoreResult<SessionLookup> {
        let now = OffsetDateTime::now_utc();
        {
            let t = self.tables.read().await;
            match t.sessions.get(token) {
                None => return Ok(SessionLookup::Missing),
                Some(s) if !s.is_expired_at(now) => return Ok(SessionLookup::Active(s.clone())),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; another request may have removed it.
        let mut t = self.tables.write().await;
        match t.sessions.remove(token) {
            Some(s) if s.is_expired_at(now) => {
                debug!(session_id = s.id, user_id = s.user_id, "expired session removed");
                Ok(SessionLookup::Expired(s))
            }
            Some(s) => {
                t.sessions.insert(s.token.clone(), s.clone());
                Ok(SessionLookup::Active(s))
            }
            None => Ok(SessionLookup::Missing),
        }
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        Ok(self.tables.write().await.sessions.remove(token).is_some())
    }

    async fn delete_user_sessions(&self, user_id: i32) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn get_timeline_items(&self) -> StoreResult<Vec<TimelineItem>> {
        let t = self.tables.read().await;
        let mut items: Vec<TimelineItem> = t.timeline.values().cloned().collect();
        items.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn get_timeline_item(&self, id: i32) -> StoreResult<Option<TimelineItem>> {
        Ok(self.tables.read().await.timeline.get(&id).cloned())
    }

    async fn create_timeline_item(&self, new: NewTimelineItem) -> StoreResult<TimelineItem> {
        let mut t = self.tables.write().await;
        let item = TimelineItem {
            id: Tables::next_id(&mut t.next_item_id),
            title: new.title,
            description: new.description,
            category: new.category,
            link: new.link,
            date: new.date,
            technologies: new.technologies,
            created_at: OffsetDateTime::now_utc(),
        };
        t.timeline.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_timeline_item(
        &self,
        id: i32,
        update: TimelineItemUpdate,
    ) -> StoreResult<Option<TimelineItem>> {
        let mut t = self.tables.write().await;
        let Some(item) = t.timeline.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = update.title {
            item.title = v;
        }
        if let Some(v) = update.description {
            item.description = v;
        }
        if let Some(v) = update.category {
            item.category = v;
        }
        if let Some(v) = update.link {
            item.link = Some(v);
        }
        if let Some(v) = update.date {
            item.date = v;
        }
        if let Some(v) = update.technologies {
            item.technologies = v;
        }
        Ok(Some(item.clone()))
    }

    async fn delete_timeline_item(&self, id: i32) -> StoreResult<bool> {
        Ok(self.tables.write().await.timeline.remove(&id).is_some())
    }
}

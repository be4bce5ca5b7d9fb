use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::debug;

use super::types::TimelineItemRow;
use super::{
    NewTimelineItem, NewUser, Session, SessionLookup, Store, StoreError, StoreResult,
    TimelineItem, TimelineItemUpdate, UniqueField, User, UserUpdate,
};

const USER_COLUMNS: &str =
    "id, email, username, password, zitadel_id, first_name, last_name, is_active, created_at";
const SESSION_COLUMNS: &str = "id, user_id, token, expires_at, created_at";
const ITEM_COLUMNS: &str =
    "id, title, description, category, link, date, technologies, created_at";

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")
    }

    async fn user_where(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

/// Map unique-constraint violations to the column that collided.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            let field = if constraint.contains("email") {
                UniqueField::Email
            } else if constraint.contains("username") {
                UniqueField::Username
            } else if constraint.contains("zitadel") {
                UniqueField::ExternalId
            } else if constraint.contains("token") {
                UniqueField::SessionToken
            } else {
                return StoreError::Database(err);
            };
            return StoreError::Conflict(field);
        }
        if db_err.is_check_violation() && db_err.constraint() == Some("users_credential_check") {
            return StoreError::MissingCredential;
        }
    }
    StoreError::Database(err)
}

fn to_item(row: TimelineItemRow) -> StoreResult<TimelineItem> {
    TimelineItem::try_from(row).map_err(StoreError::Corrupt)
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.user_where("email", email).await
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.user_where("username", username).await
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> StoreResult<Option<User>> {
        self.user_where("zitadel_id", external_id).await
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        if !new.has_credential() {
            return Err(StoreError::MissingCredential);
        }
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, password, zitadel_id, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.password)
        .bind(&new.zitadel_id)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)
    }

    async fn update_user(&self, id: i32, update: UserUpdate) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email      = COALESCE($2, email),
                username   = COALESCE($3, username),
                password   = COALESCE($4, password),
                zitadel_id = COALESCE($5, zitadel_id),
                first_name = COALESCE($6, first_name),
                last_name  = COALESCE($7, last_name),
                is_active  = COALESCE($8, is_active)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.email)
        .bind(&update.username)
        .bind(&update.password)
        .bind(&update.zitadel_id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(update.is_active)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_error)
    }

    async fn create_session(
        &self,
        user_id: i32,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<Session> {
        sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::UnknownUser(user_id)
            }
            _ => map_write_error(e),
        })
    }

    async fn get_session_by_token(&self, token: &str) -> StoreResult<SessionLookup> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        let Some(session) = session else {
            return Ok(SessionLookup::Missing);
        };
        if !session.is_expired_at(OffsetDateTime::now_utc()) {
            return Ok(SessionLookup::Active(session));
        }

        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session.id)
            .execute(&self.db)
            .await?;
        debug!(session_id = session.id, user_id = session.user_id, "expired session removed");
        Ok(SessionLookup::Expired(session))
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_user_sessions(&self, user_id: i32) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }

    async fn get_timeline_items(&self) -> StoreResult<Vec<TimelineItem>> {
        let rows = sqlx::query_as::<_, TimelineItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM timeline_items ORDER BY date ASC, id ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(to_item).collect()
    }

    async fn get_timeline_item(&self, id: i32) -> StoreResult<Option<TimelineItem>> {
        let row = sqlx::query_as::<_, TimelineItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM timeline_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_item).transpose()
    }

    async fn create_timeline_item(&self, new: NewTimelineItem) -> StoreResult<TimelineItem> {
        let row = sqlx::query_as::<_, TimelineItemRow>(&format!(
            r#"
            INSERT INTO timeline_items (title, description, category, link, date, technologies)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.category.as_str())
        .bind(&new.link)
        .bind(new.date)
        .bind(&new.technologies)
        .fetch_one(&self.db)
        .await?;
        to_item(row)
    }

    async fn update_timeline_item(
        &self,
        id: i32,
        update: TimelineItemUpdate,
    ) -> StoreResult<Option<TimelineItem>> {
        let row = sqlx::query_as::<_, TimelineItemRow>(&format!(
            r#"
            UPDATE timeline_items SET
                title        = COALESCE($2, title),
                description  = COALESCE($3, description),
                category     = COALESCE($4, category),
                link         = COALESCE($5, link),
                date         = COALESCE($6, date),
                technologies = COALESCE($7, technologies)
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.category.map(|c| c.as_str()))
        .bind(&update.link)
        .bind(update.date)
        .bind(&update.technologies)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_item).transpose()
    }

    async fn delete_timeline_item(&self, id: i32) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM timeline_items WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Option<String>, // argon2 PHC string
    pub zitadel_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields for a new user. `password` is already hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: Option<String>,
    pub zitadel_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl NewUser {
    pub(crate) fn has_credential(&self) -> bool {
        self.password.is_some() || self.zitadel_id.is_some()
    }
}

/// Partial user update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub zitadel_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Session {
    pub id: i32,
    pub user_id: i32,
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl Session {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of a session lookup. Expired rows have already been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(Session),
    Expired(Session),
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineCategory {
    Project,
    Hackathon,
    Event,
}

impl TimelineCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineCategory::Project => "project",
            TimelineCategory::Hackathon => "hackathon",
            TimelineCategory::Event => "event",
        }
    }
}

impl std::str::FromStr for TimelineCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(TimelineCategory::Project),
            "hackathon" => Ok(TimelineCategory::Hackathon),
            "event" => Ok(TimelineCategory::Event),
            other => Err(format!("unknown timeline category `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: TimelineCategory,
    pub link: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub technologies: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTimelineItem {
    pub title: String,
    pub description: String,
    pub category: TimelineCategory,
    pub link: Option<String>,
    pub date: OffsetDateTime,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<TimelineCategory>,
    pub link: Option<String>,
    pub date: Option<OffsetDateTime>,
    pub technologies: Option<Vec<String>>,
}

/// Raw `timeline_items` row; `category` is free text in the table.
#[derive(Debug, FromRow)]
pub(crate) struct TimelineItemRow {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub link: Option<String>,
    pub date: OffsetDateTime,
    pub technologies: Vec<String>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<TimelineItemRow> for TimelineItem {
    type Error = String;

    fn try_from(r: TimelineItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            title: r.title,
            description: r.description,
            category: r.category.parse()?,
            link: r.link,
            date: r.date,
            technologies: r.technologies,
            created_at: r.created_at,
        })
    }
}

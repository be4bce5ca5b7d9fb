//! Behavior both store backends must share.
//!
//! The Postgres variants need a reachable database:
//! `DATABASE_URL=postgres://... cargo test --test store_contract_tests`

use std::time::{SystemTime, UNIX_EPOCH};

use portfolio_api::auth::password::PasswordHasher;
use portfolio_api::config::AppConfig;
use portfolio_api::store::{
    MemoryStore, NewTimelineItem, NewUser, PgStore, SessionLookup, Store, StoreError,
    TimelineCategory, UserUpdate,
};
use time::{Duration, OffsetDateTime};

fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty())
}

/// Skip test with message if no database is configured.
macro_rules! require_database {
    () => {
        match database_url() {
            Some(url) => url,
            None => {
                eprintln!("Skipping: DATABASE_URL not set");
                return;
            }
        }
    };
}

async fn pg_store(url: &str) -> PgStore {
    let store = PgStore::connect(url).await.expect("connect to postgres");
    store.migrate().await.expect("migrations");
    store
}

/// Suffix keeping rows from separate runs apart in a shared database.
fn unique() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{nanos:x}")
}

fn local_user(tag: &str, hash: String) -> NewUser {
    NewUser {
        email: format!("{tag}@example.com"),
        username: format!("u{tag}"),
        password: Some(hash),
        first_name: Some("First".into()),
        ..Default::default()
    }
}

async fn users_and_passwords(store: &dyn Store) {
    let hasher = PasswordHasher::new(&AppConfig::for_tests().password).unwrap();
    let tag = unique();
    let user = store
        .create_user(local_user(&tag, hasher.hash("pw12345").unwrap()))
        .await
        .unwrap();
    assert!(user.is_active);
    assert_eq!(user.first_name.as_deref(), Some("First"));

    let by_email = store
        .validate_password(&hasher, &format!("{tag}@example.com"), "pw12345")
        .await
        .unwrap();
    assert_eq!(by_email.map(|u| u.id), Some(user.id));
    let by_name = store
        .validate_password(&hasher, &format!("u{tag}"), "pw12345")
        .await
        .unwrap();
    assert_eq!(by_name.map(|u| u.id), Some(user.id));
    assert!(store
        .validate_password(&hasher, &format!("u{tag}"), "wrong")
        .await
        .unwrap()
        .is_none());

    let dup = store
        .create_user(local_user(&tag, "h".into()))
        .await
        .unwrap_err();
    assert!(matches!(dup, StoreError::Conflict(_)));

    let no_credential = store
        .create_user(NewUser {
            email: format!("none{tag}@example.com"),
            username: format!("none{tag}"),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(no_credential, StoreError::MissingCredential));

    let updated = store
        .update_user(
            user.id,
            UserUpdate {
                last_name: Some("Last".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.first_name.as_deref(), Some("First"));
    assert_eq!(updated.last_name.as_deref(), Some("Last"));
}

async fn sessions(store: &dyn Store) {
    let tag = unique();
    let user = store
        .create_user(local_user(&tag, "h".into()))
        .await
        .unwrap();

    let unknown = store
        .create_session(i32::MAX, &format!("ghost-{tag}"), OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert!(matches!(unknown, StoreError::UnknownUser(id) if id == i32::MAX));

    let live = format!("live-{tag}");
    let stale = format!("stale-{tag}");
    let now = OffsetDateTime::now_utc();
    store
        .create_session(user.id, &live, now + Duration::days(1))
        .await
        .unwrap();
    store
        .create_session(user.id, &stale, now - Duration::minutes(1))
        .await
        .unwrap();

    assert!(matches!(
        store.get_session_by_token(&live).await.unwrap(),
        SessionLookup::Active(s) if s.user_id == user.id
    ));
    assert!(matches!(
        store.get_session_by_token(&stale).await.unwrap(),
        SessionLookup::Expired(_)
    ));
    assert!(matches!(
        store.get_session_by_token(&stale).await.unwrap(),
        SessionLookup::Missing
    ));

    assert!(store.delete_session(&live).await.unwrap());
    assert!(!store.delete_session(&live).await.unwrap());

    store
        .create_session(user.id, &format!("a-{tag}"), now + Duration::days(1))
        .await
        .unwrap();
    store
        .create_session(user.id, &format!("b-{tag}"), now + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(store.delete_user_sessions(user.id).await.unwrap(), 2);
}

async fn timeline(store: &dyn Store) {
    let tag = unique();
    let base = OffsetDateTime::now_utc() - Duration::days(365);
    let newer = store
        .create_timeline_item(NewTimelineItem {
            title: format!("newer-{tag}"),
            description: "d".into(),
            category: TimelineCategory::Hackathon,
            link: Some("https://example.com".into()),
            date: base + Duration::days(10),
            technologies: vec!["rust".into()],
        })
        .await
        .unwrap();
    let older = store
        .create_timeline_item(NewTimelineItem {
            title: format!("older-{tag}"),
            description: "d".into(),
            category: TimelineCategory::Event,
            link: None,
            date: base,
            technologies: vec![],
        })
        .await
        .unwrap();

    let ids: Vec<i32> = store
        .get_timeline_items()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .filter(|id| *id == newer.id || *id == older.id)
        .collect();
    assert_eq!(ids, [older.id, newer.id]);

    let fetched = store.get_timeline_item(newer.id).await.unwrap().unwrap();
    assert_eq!(fetched.category, TimelineCategory::Hackathon);
    assert_eq!(fetched.technologies, ["rust"]);

    assert!(store.delete_timeline_item(older.id).await.unwrap());
    assert!(store.get_timeline_item(older.id).await.unwrap().is_none());
    store.delete_timeline_item(newer.id).await.unwrap();
}

#[tokio::test]
async fn memory_store_contract() {
    let store = MemoryStore::new();
    users_and_passwords(&store).await;
    sessions(&store).await;
    timeline(&store).await;
}

#[tokio::test]
async fn postgres_users_and_passwords() {
    let url = require_database!();
    users_and_passwords(&pg_store(&url).await).await;
}

#[tokio::test]
async fn postgres_sessions() {
    let url = require_database!();
    sessions(&pg_store(&url).await).await;
}

#[tokio::test]
async fn postgres_timeline() {
    let url = require_database!();
    timeline(&pg_store(&url).await).await;
}

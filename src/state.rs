use std::sync::Arc;

use crate::auth::{jwt::TokenIssuer, password::PasswordHasher, session::SessionManager};
use crate::auth::zitadel::ZitadelClient;
use crate::config::{AppConfig, StoreBackend};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub hasher: PasswordHasher,
    pub sessions: SessionManager,
    pub zitadel: ZitadelClient,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn Store> = match &config.store {
            StoreBackend::Postgres { database_url } => {
                let pg = PgStore::connect(database_url).await?;
                pg.migrate().await?;
                tracing::info!("using postgres store");
                Arc::new(pg)
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        Self::from_parts(config, store)
    }

    pub fn from_parts(config: AppConfig, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(&config.password)?;
        let sessions = SessionManager::new(store.clone(), TokenIssuer::new(&config.jwt));
        let zitadel = ZitadelClient::new(&config.zitadel)?;
        Ok(Self {
            config: Arc::new(config),
            store,
            hasher,
            sessions,
            zitadel,
        })
    }

    /// In-memory state with test config.
    pub fn fake() -> Self {
        Self::from_parts(AppConfig::for_tests(), Arc::new(MemoryStore::new()))
            .expect("test config is valid")
    }
}

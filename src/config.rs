use tracing::warn;

/// Signing secret used when `JWT_SECRET` is unset outside production.
pub const DEV_JWT_SECRET: &str = "portfolio-dev-secret-change-me";
/// Upper bound for `SESSION_TTL_DAYS` (ten years).
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;
const DEV_ZITADEL_DOMAIN: &str = "zitadel.localhost";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct ZitadelConfig {
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub http_timeout_secs: u64,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub production: bool,
    pub store: StoreBackend,
    pub jwt: JwtConfig,
    pub zitadel: ZitadelConfig,
    pub password: PasswordConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set in production; refusing to use the built-in default")]
    InsecureDefault(&'static str),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = get("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let database_url = get("DATABASE_URL");
        let store = match get("STORE_BACKEND").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres {
                database_url: database_url.ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    reason: format!("expected `memory` or `postgres`, got `{other}`"),
                })
            }
            None => match database_url {
                Some(database_url) => StoreBackend::Postgres { database_url },
                None => StoreBackend::Memory,
            },
        };

        let secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::InsecureDefault("JWT_SECRET")),
            None => {
                warn!("JWT_SECRET not set; using the built-in development secret");
                DEV_JWT_SECRET.to_string()
            }
        };
        let ttl_days = parse_or(&get, "SESSION_TTL_DAYS", 7i64)?;
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&ttl_days) {
            return Err(ConfigError::Invalid {
                key: "SESSION_TTL_DAYS",
                reason: format!("must be between 1 and {MAX_SESSION_TTL_DAYS}"),
            });
        }
        let jwt = JwtConfig {
            secret,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "portfolio-api".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "portfolio-web".into()),
            ttl_days,
        };

        let zitadel = ZitadelConfig {
            domain: get("ZITADEL_DOMAIN").unwrap_or_else(|| {
                warn!("ZITADEL_DOMAIN not set; external login will not reach a real provider");
                DEV_ZITADEL_DOMAIN.into()
            }),
            client_id: get("ZITADEL_CLIENT_ID").unwrap_or_else(|| {
                warn!("ZITADEL_CLIENT_ID not set");
                String::new()
            }),
            client_secret: get("ZITADEL_CLIENT_SECRET").unwrap_or_else(|| {
                warn!("ZITADEL_CLIENT_SECRET not set");
                String::new()
            }),
            http_timeout_secs: parse_or(&get, "ZITADEL_HTTP_TIMEOUT_SECS", 10u64)?,
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: parse_or(&get, "PASSWORD_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&get, "PASSWORD_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&get, "PASSWORD_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            production,
            store,
            jwt,
            zitadel,
            password,
        })
    }

    /// Config used by tests: in-memory store, cheap hashing, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            production: false,
            store: StoreBackend::Memory,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_days: 7,
            },
            zitadel: ZitadelConfig {
                domain: "http://127.0.0.1:9".into(),
                client_id: "test-client".into(),
                client_secret: "test-client-secret".into(),
                http_timeout_secs: 5,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

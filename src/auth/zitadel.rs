//! OAuth authorization-code flow against a Zitadel identity provider.
//!
//! - `start`: build the authorize URL with a signed `state`
//! - `callback`: exchange the code, fetch userinfo, find or provision the user

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::config::ZitadelConfig;
use crate::store::{NewUser, Store, StoreError, User};

type HmacSha256 = Hmac<Sha256>;

pub const SCOPE: &str = "openid profile email";
pub const CALLBACK_PATH: &str = "/api/auth/zitadel/callback";

/// How long a `state` issued by `start` stays acceptable.
pub const STATE_MAX_AGE: time::Duration = time::Duration::minutes(10);

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("request to identity provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider answered {status} on {step}")]
    Status {
        step: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("identity provider did not share an email address")]
    MissingEmail,

    #[error("could not provision user: {0}")]
    Provision(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// OIDC userinfo claims we use.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub preferred_username: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[derive(Clone)]
pub struct ZitadelClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl ZitadelClient {
    pub fn new(cfg: &ZitadelConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        let domain = cfg.domain.trim_end_matches('/');
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Ok(Self {
            http,
            base_url,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        })
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}/oauth/v2/authorize?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             state={}",
            self.base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
        )
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        let response = self
            .http
            .post(format!("{}/oauth/v2/token", self.base_url))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "token exchange failed");
            return Err(ExchangeError::Status {
                step: "token exchange",
                status,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, ExchangeError> {
        let response = self
            .http
            .get(format!("{}/oidc/v1/userinfo", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!(status = %status, "userinfo request failed");
            return Err(ExchangeError::Status {
                step: "userinfo",
                status,
            });
        }
        Ok(response.json().await?)
    }
}

/// Find the local user for `info.sub`, creating one on first login.
pub async fn provision_user(store: &dyn Store, info: &UserInfo) -> Result<User, ExchangeError> {
    if let Some(user) = store.get_user_by_external_id(&info.sub).await? {
        return Ok(user);
    }

    let email = info
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or(ExchangeError::MissingEmail)?
        .to_lowercase();
    let username = info
        .preferred_username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.clone());

    let user = store
        .create_user(NewUser {
            email,
            username,
            password: None,
            zitadel_id: Some(info.sub.clone()),
            first_name: Some(info.given_name.clone().unwrap_or_default()),
            last_name: Some(info.family_name.clone().unwrap_or_default()),
        })
        .await?;
    info!(user_id = user.id, "user provisioned from identity provider");
    Ok(user)
}

/// Random nonce for the `oauth_nonce` cookie.
pub fn new_nonce() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `base64url("nonce|timestamp_hex|hmac_hex")`.
pub fn sign_state(nonce: &str, issued_at: OffsetDateTime, key: &[u8]) -> anyhow::Result<String> {
    let payload = format!("{}|{:x}", nonce, issued_at.unix_timestamp());
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("HMAC init failed: {e}"))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(URL_SAFE_NO_PAD.encode(format!("{payload}|{signature}")))
}

/// Check signature and age, and return the nonce the state was issued for.
pub fn verify_state(state: &str, key: &[u8], now: OffsetDateTime) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;

    let parts: Vec<&str> = decoded.splitn(3, '|').collect();
    let [nonce, timestamp_hex, signature_hex] = parts[..] else {
        return None;
    };

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(format!("{nonce}|{timestamp_hex}").as_bytes());
    let signature = hex::decode(signature_hex).ok()?;
    if mac.verify_slice(&signature).is_err() {
        error!("oauth state signature mismatch");
        return None;
    }

    let issued_at = i64::from_str_radix(timestamp_hex, 16).ok()?;
    let age = now.unix_timestamp() - issued_at;
    if age < 0 || age > STATE_MAX_AGE.whole_seconds() {
        return None;
    }
    Some(nonce.to_string())
}

pub fn nonce_matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::{
    cookies::{
        clear_nonce_cookie, clear_session_cookie, nonce_cookie, session_cookie, session_token,
        NONCE_COOKIE,
    },
    dto::{
        AuthResponse, CallbackParams, LoginRequest, MeResponse, MessageResponse, RegisterRequest,
    },
    extractors::CurrentUser,
    zitadel::{self, CALLBACK_PATH},
};
use crate::{
    error::{AppError, Result},
    state::AppState,
    store::{NewUser, Store, User},
};

const DASHBOARD_PATH: &str = "/dashboard";
const LOGIN_FAILED_PATH: &str = "/login?error=auth_failed";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/me", get(me))
        .route("/auth/zitadel", get(zitadel_start))
        .route("/auth/zitadel/callback", get(zitadel_callback))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let Json(mut payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;

    // Usernames cannot contain '@', so anything with one is an email.
    let identifier = if payload.email_or_username.contains('@') {
        payload.email_or_username.to_lowercase()
    } else {
        payload.email_or_username.clone()
    };

    let user = state
        .store
        .validate_password(&state.hasher, &identifier, &payload.password)
        .await?
        .ok_or_else(|| {
            warn!("login with invalid credentials");
            AppError::InvalidCredentials
        })?;

    if !user.is_active {
        warn!(user_id = user.id, "login to inactive account");
        return Err(AppError::InactiveAccount);
    }

    let (jar, token) = start_session(&state, jar, &user).await?;
    info!(user_id = user.id, "user logged in");
    Ok((
        jar,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let Json(mut payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;

    if state.store.get_user_by_email(&payload.email).await?.is_some() {
        warn!("register with taken email");
        return Err(AppError::Conflict("Email already registered".into()));
    }
    if state
        .store
        .get_user_by_username(&payload.username)
        .await?
        .is_some()
    {
        warn!(username = %payload.username, "register with taken username");
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let hash = state.hasher.hash(&payload.password)?;
    // Racing registrations still collide on the store's unique check.
    let user = state
        .store
        .create_user(NewUser {
            email: payload.email,
            username: payload.username,
            password: Some(hash),
            zitadel_id: None,
            first_name: Some(payload.first_name),
            last_name: Some(payload.last_name),
        })
        .await?;

    let (jar, token) = start_session(&state, jar, &user).await?;
    info!(user_id = user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(token) = session_token(&jar, &headers) {
        state.sessions.destroy_session(&token).await;
    }
    (
        jar.add(clear_session_cookie(state.config.production)),
        Json(MessageResponse {
            message: "Logged out successfully",
            revoked: None,
        }),
    )
}

#[instrument(skip_all)]
pub async fn logout_all(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(user): CurrentUser,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    let revoked = state.sessions.destroy_all_sessions(user.id).await?;
    Ok((
        jar.add(clear_session_cookie(state.config.production)),
        Json(MessageResponse {
            message: "Logged out from all devices",
            revoked: Some(revoked),
        }),
    ))
}

#[instrument(skip_all)]
pub async fn me(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<CurrentUser>,
) -> std::result::Result<Json<MeResponse>, (CookieJar, AppError)> {
    match user {
        Some(CurrentUser(user)) => Ok(Json(MeResponse { user: user.into() })),
        None => Err((
            jar.add(clear_session_cookie(state.config.production)),
            AppError::Unauthorized,
        )),
    }
}

#[instrument(skip_all)]
pub async fn zitadel_start(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Response> {
    let nonce = zitadel::new_nonce();
    let oauth_state = zitadel::sign_state(
        &nonce,
        OffsetDateTime::now_utc(),
        state.config.jwt.secret.as_bytes(),
    )?;
    let redirect_uri = callback_uri(&headers, state.config.production);
    let url = state.zitadel.authorize_url(&redirect_uri, &oauth_state);

    info!(redirect_uri = %redirect_uri, "redirecting to identity provider");
    Ok(found(
        jar.add(nonce_cookie(nonce, state.config.production)),
        url,
    ))
}

#[instrument(skip_all)]
pub async fn zitadel_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let production = state.config.production;

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        warn!(error = ?params.error, "callback without authorization code");
        return Err(AppError::BadRequest("Missing authorization code".into()));
    };
    if let Some(err) = params.error.as_deref() {
        warn!(error = %err, "identity provider returned an error");
        return Ok(auth_failed(jar, production));
    }

    let expected = params.state.as_deref().and_then(|s| {
        zitadel::verify_state(s, state.config.jwt.secret.as_bytes(), OffsetDateTime::now_utc())
    });
    let presented = jar.get(NONCE_COOKIE).map(|c| c.value().to_string());
    match (expected, presented) {
        (Some(expected), Some(presented)) if zitadel::nonce_matches(&expected, &presented) => {}
        _ => {
            warn!("oauth state missing, expired or not bound to this browser");
            return Ok(auth_failed(jar, production));
        }
    }

    let redirect_uri = callback_uri(&headers, production);
    let user = match complete_exchange(&state, code, &redirect_uri).await {
        Ok(user) => user,
        Err(e) => {
            error!(error = %e, "external login failed");
            return Ok(auth_failed(jar, production));
        }
    };
    if !user.is_active {
        warn!(user_id = user.id, "external login to inactive account");
        return Ok(auth_failed(jar, production));
    }

    let (jar, _) = start_session(&state, jar, &user).await?;
    info!(user_id = user.id, "user logged in via identity provider");
    Ok(found(jar.add(clear_nonce_cookie(production)), DASHBOARD_PATH.into()))
}

async fn complete_exchange(
    state: &AppState,
    code: &str,
    redirect_uri: &str,
) -> std::result::Result<User, zitadel::ExchangeError> {
    let tokens = state.zitadel.exchange_code(code, redirect_uri).await?;
    let info = state.zitadel.fetch_userinfo(&tokens.access_token).await?;
    zitadel::provision_user(state.store.as_ref(), &info).await
}

/// Persist a new session and attach its cookie.
async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, String)> {
    let session = state.sessions.create_user_session(user).await?;
    let cookie = session_cookie(
        session.token.clone(),
        session.expires_at,
        state.config.production,
    );
    Ok((jar.add(cookie), session.token))
}

fn callback_uri(headers: &HeaderMap, production: bool) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let local = host.starts_with("localhost") || host.starts_with("127.0.0.1");
    let scheme = if local && !production { "http" } else { "https" };
    format!("{scheme}://{host}{CALLBACK_PATH}")
}

fn found(jar: CookieJar, location: String) -> Response {
    (StatusCode::FOUND, jar, [(header::LOCATION, location)]).into_response()
}

fn auth_failed(jar: CookieJar, production: bool) -> Response {
    found(jar.add(clear_nonce_cookie(production)), LOGIN_FAILED_PATH.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_host(host: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::HOST, HeaderValue::from_static(host));
        h
    }

    #[test]
    fn callback_uri_scheme_follows_host() {
        assert_eq!(
            callback_uri(&with_host("localhost:8080"), false),
            "http://localhost:8080/api/auth/zitadel/callback"
        );
        assert_eq!(
            callback_uri(&with_host("127.0.0.1:3000"), false),
            "http://127.0.0.1:3000/api/auth/zitadel/callback"
        );
        assert_eq!(
            callback_uri(&with_host("example.dev"), false),
            "https://example.dev/api/auth/zitadel/callback"
        );
        assert_eq!(
            callback_uri(&with_host("localhost:8080"), true),
            "https://localhost:8080/api/auth/zitadel/callback"
        );
    }
}

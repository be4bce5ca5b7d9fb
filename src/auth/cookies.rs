use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use super::zitadel::{CALLBACK_PATH, STATE_MAX_AGE};

pub const AUTH_COOKIE: &str = "auth_token";
pub const NONCE_COOKIE: &str = "oauth_nonce";

pub fn session_cookie(token: String, expires_at: OffsetDateTime, production: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .http_only(true)
        .secure(production)
        .same_site(SameSite::Strict)
        .path("/")
        .expires(expires_at)
        .build()
}

pub fn clear_session_cookie(production: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, ""))
        .http_only(true)
        .secure(production)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Lax so the cookie survives the top-level redirect back from the provider.
pub fn nonce_cookie(nonce: String, production: bool) -> Cookie<'static> {
    Cookie::build((NONCE_COOKIE, nonce))
        .http_only(true)
        .secure(production)
        .same_site(SameSite::Lax)
        .path(CALLBACK_PATH)
        .max_age(STATE_MAX_AGE)
        .build()
}

pub fn clear_nonce_cookie(production: bool) -> Cookie<'static> {
    Cookie::build((NONCE_COOKIE, ""))
        .http_only(true)
        .secure(production)
        .same_site(SameSite::Lax)
        .path(CALLBACK_PATH)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Session token from the `auth_token` cookie, else from `Authorization: Bearer`.
pub fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(c) = jar.get(AUTH_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(c.value().to_string());
    }
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_cookie_attributes() {
        let expires = OffsetDateTime::now_utc() + Duration::days(7);
        let c = session_cookie("tok".into(), expires, false);
        assert_eq!(c.name(), AUTH_COOKIE);
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(false));
        assert_eq!(c.same_site(), Some(SameSite::Strict));
        assert_eq!(c.path(), Some("/"));
        assert!(c.expires_datetime().is_some());

        assert_eq!(session_cookie("tok".into(), expires, true).secure(), Some(true));
    }

    #[test]
    fn nonce_cookie_is_scoped_to_callback() {
        let c = nonce_cookie("n".into(), false);
        assert_eq!(c.path(), Some(CALLBACK_PATH));
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.max_age(), Some(STATE_MAX_AGE));
    }

    #[test]
    fn token_prefers_cookie_then_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE, "from-cookie"));
        assert_eq!(session_token(&jar, &headers).as_deref(), Some("from-cookie"));

        let empty = CookieJar::new();
        assert_eq!(session_token(&empty, &headers).as_deref(), Some("from-header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(session_token(&empty, &headers), None);
    }
}

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use super::cookies::session_token;
use crate::{error::AppError, state::AppState, store::User};

/// The user owning the request's live session.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar, &parts.headers).ok_or(AppError::Unauthorized)?;

        state
            .sessions
            .validate_session(&token)
            .await
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

//! Request extractors for authenticated handlers

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use carta_core::{
    auth::extract_bearer,
    db::{models::User, Repository},
    errors::{AppError, Result},
};

use crate::AppState;

/// The authenticated account, resolved from the session token
///
/// Accepts either an `Authorization: Bearer` header or the session
/// cookie. Handlers receive the full account row; core operations take
/// it as an explicit parameter.
pub struct CurrentUser(pub User);

fn session_token(parts: &Parts, cookie_name: &str) -> Option<String> {
    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer)
    {
        return Some(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = session_token(parts, &state.config.auth.cookie_name).ok_or_else(|| {
            AppError::Unauthorized {
                message: "Missing session token".to_string(),
            }
        })?;

        let claims = state.jwt.validate_token(&token)?;
        let user_id = claims.user_id()?;

        let repo = Repository::new(state.db.clone());
        let user = repo
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: "Session account no longer exists".to_string(),
            })?;

        Ok(CurrentUser(user))
    }
}

//! Account registration and session handlers

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extractors::CurrentUser;
use crate::AppState;
use carta_core::{
    auth,
    db::models::{Plan, User},
    db::Repository,
    errors::{AppError, Result},
};

use super::restaurant::{owned_restaurant, RestaurantResponse};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[validate(length(min = 1, max = 200))]
    pub restaurant_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    pub password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub plan: Plan,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let plan = user.plan();
        Self {
            id: user.id,
            email: user.email,
            plan,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Session payload: token for bearer clients, user and restaurant for the UI
#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
    pub restaurant: RestaurantResponse,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub restaurant: RestaurantResponse,
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(state.config.auth.cookie_name.clone(), token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(state.config.auth.cookie_secure);
    cookie
}

/// Register an account together with its restaurant
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let email = request.email.trim().to_lowercase();
    let password_hash = auth::hash_password(&request.password)?;

    let repo = Repository::new(state.db.clone());
    let (user, restaurant) = repo
        .register_account(email, password_hash, request.restaurant_name.trim().to_string())
        .await?;

    let token = state.jwt.generate_token(user.id)?;

    tracing::info!(
        user_id = %user.id,
        restaurant_id = %restaurant.id,
        slug = %restaurant.slug,
        "Account registered"
    );

    let jar = jar.add(session_cookie(&state, token.clone()));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse {
            token,
            user: user.into(),
            restaurant: RestaurantResponse::from_model(&state.config, restaurant),
        }),
    ))
}

/// Log in with email and password
///
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let email = request.email.trim().to_lowercase();
    let repo = Repository::new(state.db.clone());

    let user = repo
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !auth::verify_password(&request.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let restaurant = repo
        .find_restaurant_by_user(user.id)
        .await?
        .ok_or(AppError::RestaurantNotFound)?;

    let token = state.jwt.generate_token(user.id)?;

    tracing::info!(user_id = %user.id, "Login");

    let jar = jar.add(session_cookie(&state, token.clone()));

    Ok((
        jar,
        Json(SessionResponse {
            token,
            user: user.into(),
            restaurant: RestaurantResponse::from_model(&state.config, restaurant),
        }),
    ))
}

/// Clear the session cookie
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    let mut cookie = Cookie::from(state.config.auth.cookie_name.clone());
    cookie.set_path("/");

    Ok((jar.remove(cookie), StatusCode::NO_CONTENT))
}

/// Current account and restaurant
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MeResponse>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    Ok(Json(MeResponse {
        user: user.into(),
        restaurant: RestaurantResponse::from_model(&state.config, restaurant),
    }))
}

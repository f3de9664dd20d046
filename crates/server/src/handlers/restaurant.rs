//! Restaurant profile handlers

use axum::{
    extract::{Multipart, State},
    http::header,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extractors::CurrentUser;
use crate::{uploads, AppState};
use carta_core::{
    authz,
    config::AppConfig,
    db::models::{Plan, Restaurant},
    db::Repository,
    errors::{AppError, Result},
    metrics, qr,
};

/// Public layout styles the menu page understands
const LAYOUTS: &[&str] = &["list", "grid"];

/// Restaurant profile as returned to its owner
#[derive(Serialize)]
pub struct RestaurantResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub theme_color: Option<String>,
    pub layout: String,
    pub logo: Option<String>,
    pub menu_url: String,
    pub created_at: String,
}

impl RestaurantResponse {
    pub fn from_model(config: &AppConfig, restaurant: Restaurant) -> Self {
        let menu_url = config.menu_url(&restaurant.slug);
        Self {
            id: restaurant.id,
            name: restaurant.name,
            slug: restaurant.slug,
            description: restaurant.description,
            phone: restaurant.phone,
            address: restaurant.address,
            theme_color: restaurant.theme_color,
            layout: restaurant.layout,
            logo: restaurant.logo_ref,
            menu_url,
            created_at: restaurant.created_at.to_rfc3339(),
        }
    }
}

/// Profile update request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRestaurantRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(max = 50))]
    pub phone: Option<String>,

    #[validate(length(max = 500))]
    pub address: Option<String>,

    #[validate(length(max = 32))]
    pub theme_color: Option<String>,

    /// Keeps the current layout when omitted
    #[serde(default)]
    pub layout: Option<String>,
}

/// Dashboard statistics
#[derive(Serialize)]
pub struct StatsResponse {
    pub views_total: u64,
    pub products_total: u64,
    pub products_active: u64,
    pub plan: Plan,
    /// None means unlimited
    pub product_limit: Option<u64>,
}

/// Resolve the caller's restaurant and check ownership
pub(crate) async fn owned_restaurant(
    repo: &Repository,
    user: &carta_core::db::models::User,
) -> Result<Restaurant> {
    let restaurant = repo
        .find_restaurant_by_user(user.id)
        .await?
        .ok_or(AppError::RestaurantNotFound)?;

    authz::require_owner(user, &restaurant)?;
    Ok(restaurant)
}

/// Get the caller's restaurant profile
pub async fn get_restaurant(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<RestaurantResponse>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    Ok(Json(RestaurantResponse::from_model(&state.config, restaurant)))
}

/// Update the caller's restaurant profile
///
/// A name change re-derives the slug; the response carries the new one.
pub async fn update_restaurant(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UpdateRestaurantRequest>,
) -> Result<Json<RestaurantResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    if let Some(ref layout) = request.layout {
        if !LAYOUTS.contains(&layout.as_str()) {
            return Err(AppError::Validation {
                message: format!("Unknown layout '{}'. Allowed: {}", layout, LAYOUTS.join(", ")),
                field: Some("layout".to_string()),
            });
        }
    }

    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let layout = request.layout.unwrap_or_else(|| restaurant.layout.clone());
    let renamed = request.name != restaurant.name;

    let restaurant = repo
        .update_restaurant(
            restaurant,
            request.name,
            request.description,
            request.phone,
            request.address,
            request.theme_color,
            layout,
        )
        .await?;

    if renamed {
        tracing::info!(
            restaurant_id = %restaurant.id,
            slug = %restaurant.slug,
            "Restaurant renamed, slug re-derived"
        );
    }

    Ok(Json(RestaurantResponse::from_model(&state.config, restaurant)))
}

/// Upload or replace the restaurant logo
pub async fn upload_logo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Json<RestaurantResponse>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let logo_ref = uploads::store_image(&state.config.uploads, multipart).await?;
    let previous = restaurant.logo_ref.clone();

    let restaurant = repo
        .set_restaurant_logo(restaurant, Some(logo_ref))
        .await?;

    if let Some(previous) = previous {
        uploads::remove_stored(&state.config.uploads, &previous).await;
    }
    metrics::record_upload("logo");

    Ok(Json(RestaurantResponse::from_model(&state.config, restaurant)))
}

/// Download the menu QR code as SVG
pub async fn qr_svg(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl axum::response::IntoResponse> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let url = state.config.menu_url(&restaurant.slug);
    let svg = qr::menu_qr_svg(&url)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

/// Dashboard statistics for the caller's restaurant
pub async fn stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StatsResponse>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let views_total = repo.count_menu_views(restaurant.id).await?;
    let products = repo.list_products(restaurant.id).await?;
    let products_active = repo.count_active_products(restaurant.id).await?;

    Ok(Json(StatsResponse {
        views_total,
        products_total: products.len() as u64,
        products_active,
        plan: user.plan(),
        product_limit: authz::product_quota(user.plan()),
    }))
}

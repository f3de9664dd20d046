//! Category management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extractors::CurrentUser;
use crate::handlers::restaurant::owned_restaurant;
use crate::AppState;
use carta_core::{
    db::models::Category,
    db::Repository,
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub sort_order: i32,
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            sort_order: category.sort_order,
        }
    }
}

/// List the caller's categories in display order
pub async fn list_categories(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CategoryResponse>>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let categories = repo.list_categories(restaurant.id).await?;

    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

/// Create a category
pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let category = repo
        .create_category(restaurant.id, request.name, request.sort_order)
        .await?;

    tracing::info!(
        category_id = %category.id,
        restaurant_id = %restaurant.id,
        "Category created"
    );

    Ok((StatusCode::CREATED, Json(category.into())))
}

/// Update a category
pub async fn update_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(category_id): Path<Uuid>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<CategoryResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let category = repo
        .find_category(restaurant.id, category_id)
        .await?
        .ok_or_else(|| AppError::CategoryNotFound {
            id: category_id.to_string(),
        })?;

    let category = repo
        .update_category(category, request.name, request.sort_order)
        .await?;

    Ok(Json(category.into()))
}

/// Delete a category, detaching its products
pub async fn delete_category(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let category = repo
        .find_category(restaurant.id, category_id)
        .await?
        .ok_or_else(|| AppError::CategoryNotFound {
            id: category_id.to_string(),
        })?;

    repo.delete_category(category).await?;

    tracing::info!(
        category_id = %category_id,
        restaurant_id = %restaurant.id,
        "Category deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

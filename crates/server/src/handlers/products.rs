//! Product management handlers
//!
//! Every mutation resolves the caller's restaurant first and goes through
//! the plan quota where it applies; category references must resolve
//! within the same restaurant.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extractors::CurrentUser;
use crate::handlers::restaurant::owned_restaurant;
use crate::{uploads, AppState};
use carta_core::{
    authz,
    db::models::{Product, Restaurant, User},
    db::{ProductInput, Repository},
    errors::{AppError, Result},
    metrics,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    pub category_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    pub price: Decimal,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default)]
    pub sort_order: i32,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: String,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            category_id: product.category_id,
            name: product.name,
            description: product.description,
            price: product.price,
            image: product.image_ref,
            is_active: product.is_active,
            sort_order: product.sort_order,
            created_at: product.created_at.to_rfc3339(),
        }
    }
}

impl ProductRequest {
    fn validated(self) -> Result<Self> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        if self.price.is_sign_negative() {
            return Err(AppError::Validation {
                message: "Price cannot be negative".to_string(),
                field: Some("price".to_string()),
            });
        }

        Ok(self)
    }

    fn into_input(self) -> ProductInput {
        ProductInput {
            category_id: self.category_id,
            name: self.name,
            description: self.description,
            price: self.price,
            is_active: self.is_active,
            sort_order: self.sort_order,
        }
    }
}

/// The category reference, when present, must live in the same restaurant
async fn check_category(
    repo: &Repository,
    restaurant: &Restaurant,
    category_id: Option<Uuid>,
) -> Result<()> {
    if let Some(category_id) = category_id {
        repo.find_category(restaurant.id, category_id)
            .await?
            .ok_or_else(|| AppError::CategoryNotFound {
                id: category_id.to_string(),
            })?;
    }
    Ok(())
}

/// List the caller's products, inactive ones included
pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ProductResponse>>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let products = repo.list_products(restaurant.id).await?;

    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Create a product under the plan quota
pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>)> {
    let request = request.validated()?;

    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;
    check_category(&repo, &restaurant, request.category_id).await?;

    let quota = authz::product_quota(user.plan());
    let product = guarded_write(
        repo.create_product(restaurant.id, quota, request.into_input())
            .await,
        &user,
    )?;
    metrics::record_product_created();

    tracing::info!(
        product_id = %product.id,
        restaurant_id = %restaurant.id,
        "Product created"
    );

    Ok((StatusCode::CREATED, Json(product.into())))
}

/// Full-replace update of a product
pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<ProductResponse>> {
    let request = request.validated()?;

    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;
    check_category(&repo, &restaurant, request.category_id).await?;

    let product = repo
        .find_product(restaurant.id, product_id)
        .await?
        .ok_or_else(|| AppError::ProductNotFound {
            id: product_id.to_string(),
        })?;

    let quota = authz::product_quota(user.plan());
    let product = guarded_write(
        repo.update_product(product, quota, request.into_input()).await,
        &user,
    )?;

    Ok(Json(product.into()))
}

/// Delete a product and its stored image
pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let product = repo
        .find_product(restaurant.id, product_id)
        .await?
        .ok_or_else(|| AppError::ProductNotFound {
            id: product_id.to_string(),
        })?;

    let image_ref = product.image_ref.clone();
    repo.delete_product(product).await?;

    if let Some(image_ref) = image_ref {
        uploads::remove_stored(&state.config.uploads, &image_ref).await;
    }

    tracing::info!(
        product_id = %product_id,
        restaurant_id = %restaurant.id,
        "Product deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Upload or replace a product image
pub async fn upload_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ProductResponse>> {
    let repo = Repository::new(state.db.clone());
    let restaurant = owned_restaurant(&repo, &user).await?;

    let product = repo
        .find_product(restaurant.id, product_id)
        .await?
        .ok_or_else(|| AppError::ProductNotFound {
            id: product_id.to_string(),
        })?;

    let image_ref = uploads::store_image(&state.config.uploads, multipart).await?;
    let previous = product.image_ref.clone();

    let product = repo.set_product_image(product, Some(image_ref)).await?;

    if let Some(previous) = previous {
        uploads::remove_stored(&state.config.uploads, &previous).await;
    }
    metrics::record_upload("product_image");

    Ok(Json(product.into()))
}

/// Count quota rejections before surfacing them
fn guarded_write(result: Result<Product>, user: &User) -> Result<Product> {
    if let Err(AppError::PlanLimitExceeded { limit }) = &result {
        metrics::record_plan_limit_rejection();
        tracing::info!(
            user_id = %user.id,
            limit = limit,
            "Product write rejected by plan limit"
        );
    }
    result
}

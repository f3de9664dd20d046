//! Public menu projection
//!
//! Resolves a restaurant by slug and assembles the anonymous menu payload:
//! the full category list plus active products only. Every successful
//! lookup appends a view record; a failed append is logged and swallowed
//! so analytics can never take the menu down.

use crate::db::models::{Category, Product, Restaurant};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Restaurant fields safe to expose on the public menu
#[derive(Debug, Clone, Serialize)]
pub struct PublicRestaurant {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub theme_color: Option<String>,
    pub layout: String,
    pub logo: Option<String>,
}

impl From<Restaurant> for PublicRestaurant {
    fn from(restaurant: Restaurant) -> Self {
        Self {
            name: restaurant.name,
            slug: restaurant.slug,
            description: restaurant.description,
            phone: restaurant.phone,
            address: restaurant.address,
            theme_color: restaurant.theme_color,
            layout: restaurant.layout,
            logo: restaurant.logo_ref,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicCategory {
    pub id: Uuid,
    pub name: String,
    pub sort_order: i32,
}

impl From<Category> for PublicCategory {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            sort_order: category.sort_order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProduct {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image: Option<String>,
    pub sort_order: i32,
}

impl From<Product> for PublicProduct {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            category_id: product.category_id,
            name: product.name,
            description: product.description,
            price: product.price,
            image: product.image_ref,
            sort_order: product.sort_order,
        }
    }
}

/// The complete anonymous menu payload
#[derive(Debug, Clone, Serialize)]
pub struct PublicMenu {
    pub restaurant: PublicRestaurant,
    pub categories: Vec<PublicCategory>,
    pub products: Vec<PublicProduct>,
}

/// Request metadata recorded with each view
#[derive(Debug, Clone, Default)]
pub struct ViewerMeta {
    pub user_agent: Option<String>,
    pub remote_addr: Option<String>,
}

/// Fetch the public menu for a slug
///
/// Categories are returned in full, even when empty; products are
/// filtered to active ones. An unknown slug is a menu-level not-found,
/// indistinguishable from a restaurant that was deleted.
pub async fn get_public_menu(
    repo: &Repository,
    slug: &str,
    viewer: ViewerMeta,
) -> Result<PublicMenu> {
    let restaurant = repo
        .find_restaurant_by_slug(slug)
        .await?
        .ok_or(AppError::MenuNotFound)?;

    let categories = repo.list_categories(restaurant.id).await?;
    let products = repo.list_active_products(restaurant.id).await?;

    // View recording is best-effort; the menu response must not depend on it
    if let Err(e) = repo
        .record_menu_view(restaurant.id, viewer.user_agent, viewer.remote_addr)
        .await
    {
        tracing::warn!(
            restaurant_id = %restaurant.id,
            error = %e,
            "Failed to record menu view"
        );
    } else {
        crate::metrics::record_menu_view(&restaurant.slug);
    }

    Ok(PublicMenu {
        restaurant: restaurant.into(),
        categories: categories.into_iter().map(Into::into).collect(),
        products: products.into_iter().map(Into::into).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::str::FromStr;

    fn restaurant_fixture() -> Restaurant {
        let now = chrono::Utc::now();
        Restaurant {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Joe's Diner".to_string(),
            slug: "joes-diner".to_string(),
            description: Some("Comfort food".to_string()),
            phone: None,
            address: None,
            theme_color: Some("#ff6600".to_string()),
            layout: "grid".to_string(),
            logo_ref: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn category_fixture(restaurant_id: Uuid, name: &str, sort_order: i32) -> Category {
        let now = chrono::Utc::now();
        Category {
            id: Uuid::new_v4(),
            restaurant_id,
            name: name.to_string(),
            sort_order,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn product_fixture(restaurant_id: Uuid, name: &str, active: bool) -> Product {
        let now = chrono::Utc::now();
        Product {
            id: Uuid::new_v4(),
            restaurant_id,
            category_id: None,
            name: name.to_string(),
            description: None,
            price: Decimal::from_str("9.50").unwrap(),
            image_ref: None,
            is_active: active,
            sort_order: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_menu_includes_all_categories_and_active_products() {
        let restaurant = restaurant_fixture();
        let empty_category = category_fixture(restaurant.id, "Desserts", 1);
        let category = category_fixture(restaurant.id, "Mains", 0);
        let active = product_fixture(restaurant.id, "Burger", true);

        // The repository filters inactive rows in SQL, so the mock
        // returns only the active product for the product query.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![restaurant.clone()]])
            .append_query_results([vec![category.clone(), empty_category.clone()]])
            .append_query_results([vec![active.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let repo = Repository::new(DbPool::from_connection(db));

        let menu = get_public_menu(&repo, "joes-diner", ViewerMeta::default())
            .await
            .unwrap();

        assert_eq!(menu.restaurant.slug, "joes-diner");
        assert_eq!(menu.categories.len(), 2);
        assert_eq!(menu.products.len(), 1);
        assert_eq!(menu.products[0].name, "Burger");
    }

    #[tokio::test]
    async fn test_unknown_slug_is_menu_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<Restaurant>::new()])
            .into_connection();
        let repo = Repository::new(DbPool::from_connection(db));

        let result = get_public_menu(&repo, "no-such-place", ViewerMeta::default()).await;

        assert!(matches!(result, Err(AppError::MenuNotFound)));
    }

    #[tokio::test]
    async fn test_view_record_failure_does_not_fail_menu() {
        let restaurant = restaurant_fixture();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![restaurant.clone()]])
            .append_query_results([Vec::<Category>::new()])
            .append_query_results([Vec::<Product>::new()])
            .append_exec_errors([sea_orm::DbErr::Custom("analytics table offline".to_string())])
            .into_connection();
        let repo = Repository::new(DbPool::from_connection(db));

        let menu = get_public_menu(&repo, "joes-diner", ViewerMeta::default())
            .await
            .unwrap();

        assert!(menu.products.is_empty());
        assert!(menu.categories.is_empty());
    }
}

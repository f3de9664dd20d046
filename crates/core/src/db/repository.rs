//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::slug::derive_slug;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, Statement,
    TransactionTrait,
};
use uuid::Uuid;

/// Product payload for create and full-replace update operations
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub sort_order: i32,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create an account and its restaurant in one transaction
    ///
    /// Every account owns exactly one restaurant, so the two rows are
    /// created together or not at all. The slug is derived from the
    /// restaurant name and deduplicated inside the same transaction.
    pub async fn register_account(
        &self,
        email: String,
        password_hash: String,
        restaurant_name: String,
    ) -> Result<(User, Restaurant)> {
        let now = chrono::Utc::now();
        let txn = self.write_conn().begin().await?;

        let slug = self.unique_slug(&txn, &restaurant_name, None).await?;

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            password_hash: Set(password_hash),
            plan: Set(String::from(Plan::Free)),
            billing_customer_id: Set(None),
            billing_subscription_id: Set(None),
            subscription_status: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let user = match user.insert(&txn).await {
            Ok(user) => user,
            Err(err) if is_unique_violation(&err) => return Err(AppError::DuplicateEmail),
            Err(err) => return Err(err.into()),
        };

        let restaurant = RestaurantActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            name: Set(restaurant_name),
            slug: Set(slug),
            description: Set(None),
            phone: Set(None),
            address: Set(None),
            theme_color: Set(None),
            layout: Set(crate::DEFAULT_LAYOUT.to_string()),
            logo_ref: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let restaurant = restaurant.insert(&txn).await?;
        txn.commit().await?;

        Ok((user, restaurant))
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Record provider-side billing identifiers on the account
    pub async fn update_user_billing(
        &self,
        user: User,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        status: Option<SubscriptionStatus>,
    ) -> Result<User> {
        let now = chrono::Utc::now();
        let mut active: UserActiveModel = user.into();

        if let Some(customer_id) = customer_id {
            active.billing_customer_id = Set(Some(customer_id));
        }
        if let Some(subscription_id) = subscription_id {
            active.billing_subscription_id = Set(Some(subscription_id));
        }
        if let Some(status) = status {
            active.subscription_status = Set(Some(String::from(status)));
        }
        active.updated_at = Set(now.into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Set the account plan together with the provider status that justified it
    pub async fn set_user_plan(
        &self,
        user: User,
        plan: Plan,
        status: SubscriptionStatus,
    ) -> Result<User> {
        let now = chrono::Utc::now();
        let mut active: UserActiveModel = user.into();

        active.plan = Set(String::from(plan));
        active.subscription_status = Set(Some(String::from(status)));
        active.updated_at = Set(now.into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Restaurant Operations
    // ========================================================================

    /// Find the restaurant owned by a user
    pub async fn find_restaurant_by_user(&self, user_id: Uuid) -> Result<Option<Restaurant>> {
        RestaurantEntity::find()
            .filter(RestaurantColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find restaurant by ID
    pub async fn find_restaurant_by_id(&self, id: Uuid) -> Result<Option<Restaurant>> {
        RestaurantEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find restaurant by public slug (exact, case-sensitive)
    pub async fn find_restaurant_by_slug(&self, slug: &str) -> Result<Option<Restaurant>> {
        RestaurantEntity::find()
            .filter(RestaurantColumn::Slug.eq(slug))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Full-replace update of the restaurant profile
    ///
    /// A name change re-derives the slug; the old slug stops resolving.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_restaurant(
        &self,
        restaurant: Restaurant,
        name: String,
        description: Option<String>,
        phone: Option<String>,
        address: Option<String>,
        theme_color: Option<String>,
        layout: String,
    ) -> Result<Restaurant> {
        let now = chrono::Utc::now();

        let slug = if name != restaurant.name {
            self.unique_slug(self.write_conn(), &name, Some(restaurant.id))
                .await?
        } else {
            restaurant.slug.clone()
        };

        let mut active: RestaurantActiveModel = restaurant.into();
        active.name = Set(name);
        active.slug = Set(slug);
        active.description = Set(description);
        active.phone = Set(phone);
        active.address = Set(address);
        active.theme_color = Set(theme_color);
        active.layout = Set(layout);
        active.updated_at = Set(now.into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Replace the stored logo reference
    pub async fn set_restaurant_logo(
        &self,
        restaurant: Restaurant,
        logo_ref: Option<String>,
    ) -> Result<Restaurant> {
        let now = chrono::Utc::now();
        let mut active: RestaurantActiveModel = restaurant.into();
        active.logo_ref = Set(logo_ref);
        active.updated_at = Set(now.into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Derive a slug from a name, suffixing -2, -3, ... until it is free
    ///
    /// `exclude` keeps a restaurant's own row out of the collision probe so
    /// renames that keep the same slug are not treated as taken.
    async fn unique_slug<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        exclude: Option<Uuid>,
    ) -> Result<String> {
        let base = derive_slug(name);

        for attempt in 1u32.. {
            let candidate = if attempt == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };

            let mut query = RestaurantEntity::find().filter(RestaurantColumn::Slug.eq(&candidate));
            if let Some(exclude) = exclude {
                query = query.filter(RestaurantColumn::Id.ne(exclude));
            }

            if query.one(conn).await?.is_none() {
                return Ok(candidate);
            }
        }

        Err(AppError::InvariantViolation {
            message: "slug probe exhausted".to_string(),
        })
    }

    // ========================================================================
    // Category Operations
    // ========================================================================

    /// List categories for a restaurant in display order
    pub async fn list_categories(&self, restaurant_id: Uuid) -> Result<Vec<Category>> {
        CategoryEntity::find()
            .filter(CategoryColumn::RestaurantId.eq(restaurant_id))
            .order_by_asc(CategoryColumn::SortOrder)
            .order_by_asc(CategoryColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a category within a restaurant
    pub async fn find_category(&self, restaurant_id: Uuid, id: Uuid) -> Result<Option<Category>> {
        CategoryEntity::find_by_id(id)
            .filter(CategoryColumn::RestaurantId.eq(restaurant_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create a category
    pub async fn create_category(
        &self,
        restaurant_id: Uuid,
        name: String,
        sort_order: i32,
    ) -> Result<Category> {
        let now = chrono::Utc::now();

        let category = CategoryActiveModel {
            id: Set(Uuid::new_v4()),
            restaurant_id: Set(restaurant_id),
            name: Set(name),
            sort_order: Set(sort_order),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        category.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Update a category
    pub async fn update_category(
        &self,
        category: Category,
        name: String,
        sort_order: i32,
    ) -> Result<Category> {
        let now = chrono::Utc::now();
        let mut active: CategoryActiveModel = category.into();
        active.name = Set(name);
        active.sort_order = Set(sort_order);
        active.updated_at = Set(now.into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Delete a category, detaching its products
    ///
    /// Products keep existing with no category; the detach and the delete
    /// commit together.
    pub async fn delete_category(&self, category: Category) -> Result<()> {
        let txn = self.write_conn().begin().await?;

        let detach = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE products SET category_id = NULL WHERE category_id = $1",
            vec![category.id.into()],
        );
        txn.execute_raw(detach).await?;

        CategoryEntity::delete_by_id(category.id).exec(&txn).await?;
        txn.commit().await?;

        Ok(())
    }

    // ========================================================================
    // Product Operations
    // ========================================================================

    /// List all products for a restaurant in display order (owner view)
    pub async fn list_products(&self, restaurant_id: Uuid) -> Result<Vec<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::RestaurantId.eq(restaurant_id))
            .order_by_asc(ProductColumn::SortOrder)
            .order_by_asc(ProductColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List only active products (public view)
    pub async fn list_active_products(&self, restaurant_id: Uuid) -> Result<Vec<Product>> {
        ProductEntity::find()
            .filter(ProductColumn::RestaurantId.eq(restaurant_id))
            .filter(ProductColumn::IsActive.eq(true))
            .order_by_asc(ProductColumn::SortOrder)
            .order_by_asc(ProductColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a product within a restaurant
    pub async fn find_product(&self, restaurant_id: Uuid, id: Uuid) -> Result<Option<Product>> {
        ProductEntity::find_by_id(id)
            .filter(ProductColumn::RestaurantId.eq(restaurant_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Count active products for a restaurant
    pub async fn count_active_products(&self, restaurant_id: Uuid) -> Result<u64> {
        ProductEntity::find()
            .filter(ProductColumn::RestaurantId.eq(restaurant_id))
            .filter(ProductColumn::IsActive.eq(true))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create a product, enforcing the plan quota atomically
    ///
    /// The restaurant row is locked for the duration of the transaction, so
    /// the quota count cannot go stale between the check and the insert.
    /// Concurrent creations against the same restaurant serialize here.
    /// `quota` is the maximum number of active products, None for unlimited.
    pub async fn create_product(
        &self,
        restaurant_id: Uuid,
        quota: Option<u64>,
        input: ProductInput,
    ) -> Result<Product> {
        let now = chrono::Utc::now();
        let txn = self.write_conn().begin().await?;

        if let Some(limit) = quota {
            self.lock_restaurant(&txn, restaurant_id).await?;
            let active_count = self.count_active_in(&txn, restaurant_id).await?;
            if active_count >= limit {
                txn.rollback().await?;
                return Err(AppError::PlanLimitExceeded { limit });
            }
        }

        let product = ProductActiveModel {
            id: Set(Uuid::new_v4()),
            restaurant_id: Set(restaurant_id),
            category_id: Set(input.category_id),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            image_ref: Set(None),
            is_active: Set(input.is_active),
            sort_order: Set(input.sort_order),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let product = product.insert(&txn).await?;
        txn.commit().await?;

        Ok(product)
    }

    /// Full-replace update of a product
    ///
    /// Flipping a product from inactive to active goes through the same
    /// locked quota check as creation.
    pub async fn update_product(
        &self,
        product: Product,
        quota: Option<u64>,
        input: ProductInput,
    ) -> Result<Product> {
        let now = chrono::Utc::now();
        let activating = input.is_active && !product.is_active;
        let restaurant_id = product.restaurant_id;

        let txn = self.write_conn().begin().await?;

        if activating {
            if let Some(limit) = quota {
                self.lock_restaurant(&txn, restaurant_id).await?;
                let active_count = self.count_active_in(&txn, restaurant_id).await?;
                if active_count >= limit {
                    txn.rollback().await?;
                    return Err(AppError::PlanLimitExceeded { limit });
                }
            }
        }

        let mut active: ProductActiveModel = product.into();
        active.category_id = Set(input.category_id);
        active.name = Set(input.name);
        active.description = Set(input.description);
        active.price = Set(input.price);
        active.is_active = Set(input.is_active);
        active.sort_order = Set(input.sort_order);
        active.updated_at = Set(now.into());

        let product = active.update(&txn).await?;
        txn.commit().await?;

        Ok(product)
    }

    /// Replace the stored image reference
    pub async fn set_product_image(
        &self,
        product: Product,
        image_ref: Option<String>,
    ) -> Result<Product> {
        let now = chrono::Utc::now();
        let mut active: ProductActiveModel = product.into();
        active.image_ref = Set(image_ref);
        active.updated_at = Set(now.into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Delete a product permanently
    pub async fn delete_product(&self, product: Product) -> Result<()> {
        ProductEntity::delete_by_id(product.id)
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Take a row lock on the restaurant, serializing quota-checked writes
    async fn lock_restaurant<C: ConnectionTrait>(
        &self,
        conn: &C,
        restaurant_id: Uuid,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT id FROM restaurants WHERE id = $1 FOR UPDATE",
            vec![restaurant_id.into()],
        );

        conn.query_one_raw(stmt)
            .await?
            .ok_or(AppError::RestaurantNotFound)?;

        Ok(())
    }

    /// Count active products inside a transaction
    async fn count_active_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        restaurant_id: Uuid,
    ) -> Result<u64> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT COUNT(*) AS count FROM products WHERE restaurant_id = $1 AND is_active = TRUE",
            vec![restaurant_id.into()],
        );

        let row = conn
            .query_one_raw(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "count query returned no row".to_string(),
            })?;

        let count: i64 = row.try_get("", "count")?;
        Ok(count as u64)
    }

    // ========================================================================
    // Menu View Operations
    // ========================================================================

    /// Append one menu view row
    pub async fn record_menu_view(
        &self,
        restaurant_id: Uuid,
        user_agent: Option<String>,
        remote_addr: Option<String>,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO menu_views (id, restaurant_id, viewed_at, user_agent, remote_addr)
            VALUES ($1, $2, NOW(), $3, $4)
            "#,
            vec![
                Uuid::new_v4().into(),
                restaurant_id.into(),
                user_agent.into(),
                remote_addr.into(),
            ],
        );

        self.write_conn().execute_raw(stmt).await?;
        Ok(())
    }

    /// Count recorded menu views for a restaurant
    pub async fn count_menu_views(&self, restaurant_id: Uuid) -> Result<u64> {
        MenuViewEntity::find()
            .filter(MenuViewColumn::RestaurantId.eq(restaurant_id))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

/// Check whether a database error is a unique constraint violation
fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn repo_with(db: DatabaseConnection) -> Repository {
        Repository::new(DbPool {
            primary: db,
            replica: None,
        })
    }

    fn sample_input(active: bool) -> ProductInput {
        ProductInput {
            category_id: None,
            name: "Margherita".to_string(),
            description: None,
            price: Decimal::new(1250, 2),
            is_active: active,
            sort_order: 0,
        }
    }

    fn lock_row(id: Uuid) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("id", Value::from(id))])
    }

    fn count_row(count: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("count", Value::from(count))])
    }

    fn sample_product(restaurant_id: Uuid) -> Product {
        let now = chrono::Utc::now();
        Product {
            id: Uuid::new_v4(),
            restaurant_id,
            category_id: None,
            name: "Margherita".to_string(),
            description: None,
            price: Decimal::new(1250, 2),
            image_ref: None,
            is_active: true,
            sort_order: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_create_product_denied_at_quota() {
        let restaurant_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![lock_row(restaurant_id)], vec![count_row(5)]])
            .into_connection();

        let repo = repo_with(db);
        let result = repo
            .create_product(restaurant_id, Some(5), sample_input(true))
            .await;

        match result {
            Err(AppError::PlanLimitExceeded { limit }) => assert_eq!(limit, 5),
            other => panic!("expected plan limit error, got {:?}", other.map(|p| p.name)),
        }
    }

    #[tokio::test]
    async fn test_create_product_allowed_below_quota() {
        let restaurant_id = Uuid::new_v4();
        let expected = sample_product(restaurant_id);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![lock_row(restaurant_id)], vec![count_row(4)]])
            .append_query_results([vec![expected.clone()]])
            .into_connection();

        let repo = repo_with(db);
        let created = repo
            .create_product(restaurant_id, Some(5), sample_input(true))
            .await
            .unwrap();

        assert_eq!(created.name, expected.name);
        assert_eq!(created.price, expected.price);
    }

    #[tokio::test]
    async fn test_create_product_unlimited_skips_lock() {
        let restaurant_id = Uuid::new_v4();
        let expected = sample_product(restaurant_id);

        // No lock or count results scripted: the premium path must not query them
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![expected.clone()]])
            .into_connection();

        let repo = repo_with(db);
        let created = repo
            .create_product(restaurant_id, None, sample_input(true))
            .await
            .unwrap();

        assert_eq!(created.id, expected.id);
    }

    #[tokio::test]
    async fn test_delete_category_detaches_products() {
        let restaurant_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            restaurant_id,
            name: "Starters".to_string(),
            sort_order: 0,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let repo = repo_with(db);
        assert!(repo.delete_category(category).await.is_ok());
    }

    #[tokio::test]
    async fn test_unique_slug_suffixes_on_collision() {
        let now = chrono::Utc::now();
        let taken = Restaurant {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Joe's Diner".to_string(),
            slug: "joes-diner".to_string(),
            description: None,
            phone: None,
            address: None,
            theme_color: None,
            layout: "list".to_string(),
            logo_ref: None,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![taken], vec![]])
            .into_connection();

        let repo = repo_with(db);
        let slug = repo
            .unique_slug(repo.read_conn(), "Joe's Diner", None)
            .await
            .unwrap();

        assert_eq!(slug, "joes-diner-2");
    }

    #[tokio::test]
    async fn test_record_menu_view_inserts_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let repo = repo_with(db);
        assert!(repo
            .record_menu_view(Uuid::new_v4(), Some("curl/8".to_string()), None)
            .await
            .is_ok());
    }
}

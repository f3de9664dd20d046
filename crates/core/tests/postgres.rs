//! Integration tests against a real Postgres database.
//!
//! Gated on TEST_DATABASE_URL; without it every test skips so the suite
//! stays green on machines without a database. Run with:
//!
//! ```text
//! TEST_DATABASE_URL=postgres://localhost/carta_test \
//!     cargo test -p carta-core --test postgres
//! ```
//!
//! Tests share one database. Every fixture carries a random tag so runs
//! never collide with leftovers from earlier ones.

use carta_core::authz::FREE_PLAN_PRODUCT_LIMIT;
use carta_core::config::AppConfig;
use carta_core::db::models::{Plan, Restaurant, User};
use carta_core::db::{DbPool, ProductInput, Repository};
use carta_core::errors::AppError;
use carta_core::menu::{self, ViewerMeta};
use rust_decimal::Decimal;
use uuid::Uuid;

async fn repo() -> Option<Repository> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping Postgres integration test");
            return None;
        }
    };

    let mut db_config = AppConfig::default().database;
    db_config.url = url;

    let pool = DbPool::new(&db_config).await.expect("database connection");
    pool.migrate().await.expect("migrations");

    Some(Repository::new(pool))
}

fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn register(repo: &Repository, tag: &str, restaurant_name: &str) -> (User, Restaurant) {
    repo.register_account(
        format!("owner-{}-{}@example.com", tag, Uuid::new_v4().simple()),
        "integration-test-hash".to_string(),
        restaurant_name.to_string(),
    )
    .await
    .expect("registration")
}

fn product(name: &str, active: bool) -> ProductInput {
    ProductInput {
        category_id: None,
        name: name.to_string(),
        description: None,
        price: Decimal::new(950, 2),
        is_active: active,
        sort_order: 0,
    }
}

#[tokio::test]
async fn registration_creates_account_with_derived_slug() {
    let Some(repo) = repo().await else { return };
    let tag = tag();

    let (user, restaurant) = repo
        .register_account(
            format!("owner-{}@example.com", tag),
            "integration-test-hash".to_string(),
            format!("  Chez   {} Bistro!  ", tag),
        )
        .await
        .expect("registration");

    assert_eq!(user.plan(), Plan::Free);
    assert_eq!(restaurant.user_id, user.id);
    assert_eq!(restaurant.slug, format!("chez-{}-bistro", tag));
    assert_eq!(restaurant.layout, "list");

    let found = repo
        .find_restaurant_by_slug(&restaurant.slug)
        .await
        .expect("slug lookup");
    assert_eq!(found.map(|r| r.id), Some(restaurant.id));

    // Same email again must be rejected, and must not leave a restaurant behind
    let duplicate = repo
        .register_account(
            format!("owner-{}@example.com", tag),
            "integration-test-hash".to_string(),
            format!("Second {} Attempt", tag),
        )
        .await;
    match duplicate {
        Err(AppError::DuplicateEmail) => {}
        other => panic!("expected DuplicateEmail, got {:?}", other.map(|_| ())),
    }
    let orphan = repo
        .find_restaurant_by_slug(&format!("second-{}-attempt", tag))
        .await
        .expect("orphan lookup");
    assert!(orphan.is_none());
}

#[tokio::test]
async fn same_name_registrations_get_suffixed_slugs() {
    let Some(repo) = repo().await else { return };
    let tag = tag();
    let name = format!("Cafe {}", tag);

    let (_, first) = register(&repo, &tag, &name).await;
    let (_, second) = register(&repo, &tag, &name).await;
    let (_, third) = register(&repo, &tag, &name).await;

    assert_eq!(first.slug, format!("cafe-{}", tag));
    assert_eq!(second.slug, format!("cafe-{}-2", tag));
    assert_eq!(third.slug, format!("cafe-{}-3", tag));
}

#[tokio::test]
async fn free_plan_product_limit_is_enforced() {
    let Some(repo) = repo().await else { return };
    let tag = tag();
    let quota = Some(FREE_PLAN_PRODUCT_LIMIT);

    let (_, restaurant) = register(&repo, &tag, &format!("Quota House {}", tag)).await;

    for i in 0..FREE_PLAN_PRODUCT_LIMIT {
        repo.create_product(restaurant.id, quota, product(&format!("Dish {}", i), true))
            .await
            .expect("create within limit");
    }

    // Sixth active product is rejected
    let over = repo
        .create_product(restaurant.id, quota, product("One Too Many", true))
        .await;
    match over {
        Err(AppError::PlanLimitExceeded { limit }) => assert_eq!(limit, FREE_PLAN_PRODUCT_LIMIT),
        other => panic!("expected PlanLimitExceeded, got {:?}", other.map(|p| p.name)),
    }

    // Inactive products do not count against the limit
    let draft = repo
        .create_product(restaurant.id, quota, product("Draft Dish", false))
        .await
        .expect("inactive create");

    // Deactivating one frees a slot
    let parked = repo
        .find_product(restaurant.id, draft.id)
        .await
        .expect("lookup")
        .expect("draft exists");
    let victim = repo
        .list_active_products(restaurant.id)
        .await
        .expect("list actives")
        .into_iter()
        .next()
        .expect("one active");
    let mut off = product(&victim.name, false);
    off.sort_order = victim.sort_order;
    repo.update_product(victim, quota, off)
        .await
        .expect("deactivate");

    repo.create_product(restaurant.id, quota, product("Backfill Dish", true))
        .await
        .expect("create after deactivation");

    // Activating the parked draft would go past the limit again
    let on = product(&parked.name, true);
    match repo.update_product(parked.clone(), quota, on).await {
        Err(AppError::PlanLimitExceeded { .. }) => {}
        other => panic!("expected PlanLimitExceeded, got {:?}", other.map(|p| p.name)),
    }

    // Premium has no quota
    repo.update_product(parked, None, product("Draft Dish", true))
        .await
        .expect("unlimited activation");

    assert_eq!(
        repo.count_active_products(restaurant.id).await.expect("count"),
        FREE_PLAN_PRODUCT_LIMIT + 1
    );
}

#[tokio::test]
async fn concurrent_product_creates_never_exceed_limit() {
    let Some(repo) = repo().await else { return };
    let tag = tag();
    let quota = Some(FREE_PLAN_PRODUCT_LIMIT);

    let (_, restaurant) = register(&repo, &tag, &format!("Race Bar {}", tag)).await;

    for i in 0..FREE_PLAN_PRODUCT_LIMIT - 1 {
        repo.create_product(restaurant.id, quota, product(&format!("Dish {}", i), true))
            .await
            .expect("seed product");
    }

    // One slot left, two writers racing for it
    let other = repo.clone();
    let (a, b) = tokio::join!(
        repo.create_product(restaurant.id, quota, product("Race A", true)),
        other.create_product(restaurant.id, quota, product("Race B", true)),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one racer may take the last slot");

    assert_eq!(
        repo.count_active_products(restaurant.id).await.expect("count"),
        FREE_PLAN_PRODUCT_LIMIT
    );
}

#[tokio::test]
async fn category_delete_detaches_products() {
    let Some(repo) = repo().await else { return };
    let tag = tag();

    let (_, restaurant) = register(&repo, &tag, &format!("Detach Deli {}", tag)).await;
    let (_, stranger) = register(&repo, &tag, &format!("Other Deli {}", tag)).await;

    let desserts = repo
        .create_category(restaurant.id, "Desserts".to_string(), 2)
        .await
        .expect("category");
    let starters = repo
        .create_category(restaurant.id, "Starters".to_string(), 1)
        .await
        .expect("category");

    let mut input = product("Soup of the Day", true);
    input.category_id = Some(starters.id);
    let soup = repo
        .create_product(restaurant.id, None, input)
        .await
        .expect("product");
    assert_eq!(soup.category_id, Some(starters.id));

    // Listing is ordered by sort_order
    let listed = repo.list_categories(restaurant.id).await.expect("list");
    assert_eq!(
        listed.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["Starters", "Desserts"]
    );

    // Scoped lookups never cross tenants
    assert!(repo
        .find_category(stranger.id, starters.id)
        .await
        .expect("scoped category lookup")
        .is_none());
    assert!(repo
        .find_product(stranger.id, soup.id)
        .await
        .expect("scoped product lookup")
        .is_none());

    repo.delete_category(starters).await.expect("delete");

    let detached = repo
        .find_product(restaurant.id, soup.id)
        .await
        .expect("lookup")
        .expect("product survives");
    assert_eq!(detached.category_id, None);

    let remaining = repo.list_categories(restaurant.id).await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, desserts.id);
}

#[tokio::test]
async fn public_menu_projects_active_products_and_counts_views() {
    let Some(repo) = repo().await else { return };
    let tag = tag();

    let (_, restaurant) = register(&repo, &tag, &format!("View Bar {}", tag)).await;

    let drinks = repo
        .create_category(restaurant.id, "Drinks".to_string(), 1)
        .await
        .expect("category");
    repo.create_category(restaurant.id, "Empty Corner".to_string(), 2)
        .await
        .expect("category");

    let mut lemonade = product("Lemonade", true);
    lemonade.category_id = Some(drinks.id);
    repo.create_product(restaurant.id, None, lemonade)
        .await
        .expect("product");
    repo.create_product(restaurant.id, None, product("Seasonal Special", false))
        .await
        .expect("product");

    assert_eq!(repo.count_menu_views(restaurant.id).await.expect("count"), 0);

    let viewers = [
        ViewerMeta {
            user_agent: Some("Mozilla/5.0".to_string()),
            remote_addr: Some("203.0.113.7".to_string()),
        },
        ViewerMeta::default(),
        ViewerMeta {
            user_agent: Some("curl/8.5".to_string()),
            remote_addr: None,
        },
    ];
    for viewer in viewers {
        let menu = menu::get_public_menu(&repo, &restaurant.slug, viewer)
            .await
            .expect("public menu");

        assert_eq!(menu.restaurant.slug, restaurant.slug);
        // Every category is published, even an empty one
        assert_eq!(
            menu.categories
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Drinks", "Empty Corner"]
        );
        // Only active products are published
        assert_eq!(menu.products.len(), 1);
        assert_eq!(menu.products[0].name, "Lemonade");
        assert_eq!(menu.products[0].category_id, Some(drinks.id));
    }

    // One row per successful fetch
    assert_eq!(repo.count_menu_views(restaurant.id).await.expect("count"), 3);

    let missing =
        menu::get_public_menu(&repo, &format!("no-such-menu-{}", tag), ViewerMeta::default())
            .await;
    match missing {
        Err(AppError::MenuNotFound) => {}
        other => panic!("expected MenuNotFound, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn rename_rederives_slug_and_dodges_collisions() {
    let Some(repo) = repo().await else { return };
    let tag = tag();

    let (_, blue) = register(&repo, &tag, &format!("Blue {} Cafe", tag)).await;
    let (_, red) = register(&repo, &tag, &format!("Red {} Cafe", tag)).await;
    assert_eq!(blue.slug, format!("blue-{}-cafe", tag));

    // Renaming into an occupied name gets the suffix
    let renamed = repo
        .update_restaurant(
            red,
            format!("Blue {} Cafe", tag),
            None,
            None,
            None,
            None,
            "list".to_string(),
        )
        .await
        .expect("rename");
    assert_eq!(renamed.slug, format!("blue-{}-cafe-2", tag));

    // Profile edits without a name change keep the slug
    let edited = repo
        .update_restaurant(
            renamed,
            format!("Blue {} Cafe", tag),
            Some("Now under new management".to_string()),
            Some("+1 555 0100".to_string()),
            None,
            Some("#2244ff".to_string()),
            "grid".to_string(),
        )
        .await
        .expect("edit");
    assert_eq!(edited.slug, format!("blue-{}-cafe-2", tag));
    assert_eq!(edited.layout, "grid");
}

//! Authorization rules
//!
//! Two gates cover every mutating operation:
//! - ownership: a user may only touch the restaurant they own, with no
//!   admin override and no cross-tenant read path
//! - plan quota: the free plan caps the number of active products
//!
//! Both take the identity explicitly; nothing here reads ambient state.
//! The quota check is also re-applied inside the repository's locked
//! transaction, where the count is authoritative.

use crate::db::models::{Plan, Restaurant, User};
use crate::errors::{AppError, Result};

/// Maximum active products on the free plan
pub const FREE_PLAN_PRODUCT_LIMIT: u64 = 5;

/// Allow only the owning account through
pub fn require_owner(user: &User, restaurant: &Restaurant) -> Result<()> {
    if restaurant.user_id == user.id {
        Ok(())
    } else {
        Err(AppError::NotOwner)
    }
}

/// Active-product quota for a plan, None for unlimited
pub fn product_quota(plan: Plan) -> Option<u64> {
    match plan {
        Plan::Free => Some(FREE_PLAN_PRODUCT_LIMIT),
        Plan::Premium => None,
    }
}

/// Check whether a plan admits another product at the given active count
pub fn check_product_quota(plan: Plan, active_count: u64) -> Result<()> {
    match product_quota(plan) {
        Some(limit) if active_count >= limit => Err(AppError::PlanLimitExceeded { limit }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(id: Uuid, plan: Plan) -> User {
        let now = chrono::Utc::now();
        User {
            id,
            email: "owner@example.com".to_string(),
            password_hash: "x".to_string(),
            plan: String::from(plan),
            billing_customer_id: None,
            billing_subscription_id: None,
            subscription_status: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn restaurant(user_id: Uuid) -> Restaurant {
        let now = chrono::Utc::now();
        Restaurant {
            id: Uuid::new_v4(),
            user_id,
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
        }
    }

    #[test]
    fn test_owner_allowed() {
        let owner = user(Uuid::new_v4(), Plan::Free);
        let shop = restaurant(owner.id);
        assert!(require_owner(&owner, &shop).is_ok());
    }

    #[test]
    fn test_non_owner_denied() {
        let owner = user(Uuid::new_v4(), Plan::Free);
        let intruder = user(Uuid::new_v4(), Plan::Premium);
        let shop = restaurant(owner.id);

        match require_owner(&intruder, &shop) {
            Err(AppError::NotOwner) => {}
            other => panic!("expected NotOwner, got {:?}", other),
        }
    }

    #[test]
    fn test_free_quota_matrix() {
        for count in 0..FREE_PLAN_PRODUCT_LIMIT {
            assert!(check_product_quota(Plan::Free, count).is_ok(), "count {}", count);
        }
        for count in [FREE_PLAN_PRODUCT_LIMIT, 6, 50] {
            match check_product_quota(Plan::Free, count) {
                Err(AppError::PlanLimitExceeded { limit }) => {
                    assert_eq!(limit, FREE_PLAN_PRODUCT_LIMIT)
                }
                other => panic!("expected limit error at {}, got {:?}", count, other),
            }
        }
    }

    #[test]
    fn test_premium_never_limited() {
        for count in [0, 5, 500, 10_000] {
            assert!(check_product_quota(Plan::Premium, count).is_ok());
        }
        assert_eq!(product_quota(Plan::Premium), None);
    }
}

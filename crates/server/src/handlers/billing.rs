//! Premium upgrade handlers
//!
//! `upgrade` starts (or resumes) the provider subscription and returns the
//! client token; `confirm` reconciles the plan with what the provider
//! reports. The plan never changes anywhere else.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::extractors::CurrentUser;
use crate::AppState;
use carta_core::{
    billing::UpgradeCheckout,
    db::models::{Plan, SubscriptionStatus},
    db::Repository,
    errors::Result,
};

#[derive(Serialize)]
pub struct PlanResponse {
    pub plan: Plan,
    pub subscription_status: Option<SubscriptionStatus>,
}

/// Start or resume the premium upgrade
pub async fn upgrade(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UpgradeCheckout>> {
    let repo = Repository::new(state.db.clone());
    let (_, checkout) = state.billing.begin_upgrade(&repo, user).await?;

    Ok(Json(checkout))
}

/// Reconcile the plan against the provider's subscription state
pub async fn confirm(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<PlanResponse>> {
    let repo = Repository::new(state.db.clone());
    let user = state.billing.reconcile(&repo, user).await?;

    Ok(Json(PlanResponse {
        plan: user.plan(),
        subscription_status: user.subscription_status(),
    }))
}

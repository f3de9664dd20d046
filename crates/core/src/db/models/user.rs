//! User (account) entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription plan enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Premium,
}

impl From<String> for Plan {
    fn from(s: String) -> Self {
        match s.as_str() {
            "premium" => Plan::Premium,
            _ => Plan::Free,
        }
    }
}

impl From<Plan> for String {
    fn from(plan: Plan) -> Self {
        match plan {
            Plan::Free => "free".to_string(),
            Plan::Premium => "premium".to_string(),
        }
    }
}

/// Provider-side subscription status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    /// Whether this status entitles the account to premium features
    pub fn is_live(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl From<String> for SubscriptionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "unpaid" => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::Incomplete,
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Incomplete => "incomplete".to_string(),
            SubscriptionStatus::IncompleteExpired => "incomplete_expired".to_string(),
            SubscriptionStatus::Trialing => "trialing".to_string(),
            SubscriptionStatus::Active => "active".to_string(),
            SubscriptionStatus::PastDue => "past_due".to_string(),
            SubscriptionStatus::Canceled => "canceled".to_string(),
            SubscriptionStatus::Unpaid => "unpaid".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    #[sea_orm(column_type = "Text")]
    pub password_hash: String,

    #[sea_orm(column_type = "Text")]
    pub plan: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub billing_customer_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub billing_subscription_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub subscription_status: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the plan as an enum
    pub fn plan(&self) -> Plan {
        Plan::from(self.plan.clone())
    }

    /// Check if the account is on the premium plan
    pub fn is_premium(&self) -> bool {
        self.plan() == Plan::Premium
    }

    /// Get the recorded subscription status, if any
    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        self.subscription_status
            .clone()
            .map(SubscriptionStatus::from)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::restaurant::Entity")]
    Restaurant,
}

impl Related<super::restaurant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Restaurant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

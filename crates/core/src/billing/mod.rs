//! Billing bridge for plan upgrades
//!
//! Talks to a Stripe-shaped REST provider behind the [`BillingProvider`]
//! trait. The bridge owns the two externally visible operations:
//!
//! - `begin_upgrade`: create (or re-fetch) the incomplete subscription and
//!   hand the client token back for payment collection. Idempotent: a
//!   recorded subscription id is always re-fetched, never recreated.
//! - `reconcile`: re-fetch the recorded subscription and set the plan from
//!   what the provider reports. Premium is granted only on a provider
//!   confirmed live status, never at subscription creation time.
//!
//! Provider calls are never retried; retrying payment object creation can
//! charge twice.

use crate::config::BillingConfig;
use crate::db::models::{Plan, SubscriptionStatus, User};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Customer handle at the provider
#[derive(Debug, Clone)]
pub struct ProviderCustomer {
    pub id: String,
}

/// Subscription state at the provider
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: SubscriptionStatus,
    /// Client-side payment token for completing the initial payment
    pub client_token: Option<String>,
}

/// Checkout data returned to the caller of `begin_upgrade`
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpgradeCheckout {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub client_token: Option<String>,
}

/// Trait for the payment provider
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer keyed to the account email
    async fn create_customer(&self, email: &str) -> Result<ProviderCustomer>;

    /// Create a monthly recurring price, returning its id
    async fn create_price(
        &self,
        amount_cents: u64,
        currency: &str,
        product_name: &str,
    ) -> Result<String>;

    /// Create a subscription left incomplete until its first payment
    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<ProviderSubscription>;

    /// Fetch the current state of a subscription
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription>;
}

/// HTTP billing provider client (Stripe-compatible REST API)
pub struct HttpBillingProvider {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Deserialize)]
struct PriceResponse {
    id: String,
}

#[derive(Deserialize)]
struct SubscriptionResponse {
    id: String,
    status: String,
    #[serde(default)]
    latest_invoice: Option<InvoiceResponse>,
}

#[derive(Deserialize)]
struct InvoiceResponse {
    #[serde(default)]
    payment_intent: Option<PaymentIntentResponse>,
}

#[derive(Deserialize)]
struct PaymentIntentResponse {
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderErrorDetail>,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: Option<String>,
}

impl SubscriptionResponse {
    fn into_subscription(self) -> ProviderSubscription {
        ProviderSubscription {
            id: self.id,
            status: SubscriptionStatus::from(self.status),
            client_token: self
                .latest_invoice
                .and_then(|invoice| invoice.payment_intent)
                .and_then(|intent| intent.client_secret),
        }
    }
}

impl HttpBillingProvider {
    /// Create a new provider client
    pub fn new(secret_key: String, base_url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            secret_key,
            base_url,
        }
    }

    /// POST a form-encoded request; no retries on failure
    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::BillingProvider {
                message: format!("Request failed: {}", e),
            })?;

        Self::parse_response(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::BillingProvider {
                message: format!("Request failed: {}", e),
            })?;

        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            // Surface the provider's own message when it sends one
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or(body);

            return Err(AppError::BillingProvider {
                message: format!("API error {}: {}", status, message),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::BillingProvider {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    async fn create_customer(&self, email: &str) -> Result<ProviderCustomer> {
        let response: CustomerResponse = self
            .post_form("/customers", &[("email", email.to_string())])
            .await?;

        Ok(ProviderCustomer { id: response.id })
    }

    async fn create_price(
        &self,
        amount_cents: u64,
        currency: &str,
        product_name: &str,
    ) -> Result<String> {
        let response: PriceResponse = self
            .post_form(
                "/prices",
                &[
                    ("unit_amount", amount_cents.to_string()),
                    ("currency", currency.to_string()),
                    ("recurring[interval]", "month".to_string()),
                    ("product_data[name]", product_name.to_string()),
                ],
            )
            .await?;

        Ok(response.id)
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<ProviderSubscription> {
        let response: SubscriptionResponse = self
            .post_form(
                "/subscriptions",
                &[
                    ("customer", customer_id.to_string()),
                    ("items[0][price]", price_id.to_string()),
                    ("payment_behavior", "default_incomplete".to_string()),
                    (
                        "payment_settings[save_default_payment_method]",
                        "on_subscription".to_string(),
                    ),
                    ("expand[]", "latest_invoice.payment_intent".to_string()),
                ],
            )
            .await?;

        Ok(response.into_subscription())
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription> {
        let response: SubscriptionResponse = self
            .get(
                &format!("/subscriptions/{}", subscription_id),
                &[("expand[]", "latest_invoice.payment_intent")],
            )
            .await?;

        Ok(response.into_subscription())
    }
}

/// Mock billing provider for testing
pub struct MockBillingProvider {
    state: std::sync::Mutex<MockState>,
}

struct MockState {
    customers_created: u32,
    prices_created: u32,
    subscriptions_created: u32,
    retrievals: u32,
    status: SubscriptionStatus,
    fail_message: Option<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(MockState {
                customers_created: 0,
                prices_created: 0,
                subscriptions_created: 0,
                retrievals: 0,
                status: SubscriptionStatus::Incomplete,
                fail_message: None,
            }),
        }
    }

    /// Make every following call fail with the given message
    pub fn fail_with(&self, message: &str) {
        self.state.lock().unwrap().fail_message = Some(message.to_string());
    }

    /// Set the status reported for subscriptions from now on
    pub fn set_status(&self, status: SubscriptionStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn customers_created(&self) -> u32 {
        self.state.lock().unwrap().customers_created
    }

    pub fn subscriptions_created(&self) -> u32 {
        self.state.lock().unwrap().subscriptions_created
    }

    pub fn retrievals(&self) -> u32 {
        self.state.lock().unwrap().retrievals
    }

    fn check_failure(state: &MockState) -> Result<()> {
        if let Some(ref message) = state.fail_message {
            return Err(AppError::BillingProvider {
                message: message.clone(),
            });
        }
        Ok(())
    }
}

impl Default for MockBillingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_customer(&self, _email: &str) -> Result<ProviderCustomer> {
        let mut state = self.state.lock().unwrap();
        state.customers_created += 1;
        Self::check_failure(&state)?;

        Ok(ProviderCustomer {
            id: format!("cus_mock_{}", state.customers_created),
        })
    }

    async fn create_price(
        &self,
        _amount_cents: u64,
        _currency: &str,
        _product_name: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.prices_created += 1;
        Self::check_failure(&state)?;

        Ok(format!("price_mock_{}", state.prices_created))
    }

    async fn create_subscription(
        &self,
        _customer_id: &str,
        _price_id: &str,
    ) -> Result<ProviderSubscription> {
        let mut state = self.state.lock().unwrap();
        state.subscriptions_created += 1;
        Self::check_failure(&state)?;

        Ok(ProviderSubscription {
            id: format!("sub_mock_{}", state.subscriptions_created),
            status: SubscriptionStatus::Incomplete,
            client_token: Some(format!("pi_mock_secret_{}", state.subscriptions_created)),
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription> {
        let mut state = self.state.lock().unwrap();
        state.retrievals += 1;
        Self::check_failure(&state)?;

        Ok(ProviderSubscription {
            id: subscription_id.to_string(),
            status: state.status,
            client_token: Some("pi_mock_secret_1".to_string()),
        })
    }
}

/// Create a billing provider from configuration
pub fn create_provider(config: &BillingConfig) -> Arc<dyn BillingProvider> {
    match config.secret_key {
        Some(ref key) => Arc::new(HttpBillingProvider::new(
            key.clone(),
            config.api_base.clone(),
            config.timeout_secs,
        )),
        None => {
            tracing::warn!("No billing secret key configured, using mock provider");
            Arc::new(MockBillingProvider::new())
        }
    }
}

/// Bridge between accounts and the payment provider
#[derive(Clone)]
pub struct BillingBridge {
    provider: Arc<dyn BillingProvider>,
    config: BillingConfig,
}

impl BillingBridge {
    pub fn new(provider: Arc<dyn BillingProvider>, config: BillingConfig) -> Self {
        Self { provider, config }
    }

    /// Start (or resume) a premium upgrade
    ///
    /// Returns the account with refreshed billing fields plus the checkout
    /// data. The plan itself is untouched; only `reconcile` changes it.
    pub async fn begin_upgrade(
        &self,
        repo: &Repository,
        user: User,
    ) -> Result<(User, UpgradeCheckout)> {
        // A recorded subscription is re-fetched, never recreated
        if let Some(subscription_id) = user.billing_subscription_id.clone() {
            let subscription = self.provider.retrieve_subscription(&subscription_id).await?;

            tracing::info!(
                user_id = %user.id,
                subscription_id = %subscription.id,
                status = ?subscription.status,
                "Resuming existing upgrade"
            );

            let user = repo
                .update_user_billing(user, None, None, Some(subscription.status))
                .await?;

            return Ok((
                user,
                UpgradeCheckout {
                    subscription_id: subscription.id,
                    status: subscription.status,
                    client_token: subscription.client_token,
                },
            ));
        }

        if user.email.is_empty() {
            return Err(AppError::InvariantViolation {
                message: "account has no email for billing".to_string(),
            });
        }

        let customer_id = match user.billing_customer_id.clone() {
            Some(id) => id,
            None => self.provider.create_customer(&user.email).await?.id,
        };

        let price_id = self
            .provider
            .create_price(
                self.config.premium_price_cents,
                &self.config.currency,
                &self.config.product_name,
            )
            .await?;

        let subscription = self
            .provider
            .create_subscription(&customer_id, &price_id)
            .await?;

        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            "Created incomplete subscription"
        );

        let user = repo
            .update_user_billing(
                user,
                Some(customer_id),
                Some(subscription.id.clone()),
                Some(subscription.status),
            )
            .await?;

        crate::metrics::record_upgrade_started();

        Ok((
            user,
            UpgradeCheckout {
                subscription_id: subscription.id,
                status: subscription.status,
                client_token: subscription.client_token,
            },
        ))
    }

    /// Reconcile the plan with what the provider reports
    ///
    /// Premium iff the provider says the subscription is live; anything
    /// else (incomplete, canceled, unpaid, ...) lands on free.
    pub async fn reconcile(&self, repo: &Repository, user: User) -> Result<User> {
        let subscription_id =
            user.billing_subscription_id
                .clone()
                .ok_or_else(|| AppError::Validation {
                    message: "No upgrade in progress for this account".to_string(),
                    field: None,
                })?;

        let subscription = self.provider.retrieve_subscription(&subscription_id).await?;

        let plan = if subscription.status.is_live() {
            Plan::Premium
        } else {
            Plan::Free
        };

        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription_id,
            status = ?subscription.status,
            plan = ?plan,
            "Reconciled subscription"
        );

        let previous_plan = user.plan();
        let user = repo.set_user_plan(user, plan, subscription.status).await?;

        if previous_plan != plan {
            crate::metrics::record_plan_change(plan);
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use uuid::Uuid;

    fn test_user(
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
        plan: Plan,
        status: Option<SubscriptionStatus>,
    ) -> User {
        let now = chrono::Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            password_hash: "x".to_string(),
            plan: String::from(plan),
            billing_customer_id: customer_id.map(String::from),
            billing_subscription_id: subscription_id.map(String::from),
            subscription_status: status.map(String::from),
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn bridge_with(provider: Arc<dyn BillingProvider>) -> BillingBridge {
        BillingBridge::new(provider, BillingConfig {
            api_base: "http://unused".to_string(),
            secret_key: None,
            premium_price_cents: 999,
            currency: "usd".to_string(),
            product_name: "Carta Premium".to_string(),
            timeout_secs: 5,
        })
    }

    fn repo_returning(users: Vec<Vec<User>>) -> Repository {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(users)
            .into_connection();
        Repository::new(DbPool::from_connection(db))
    }

    #[tokio::test]
    async fn test_begin_upgrade_is_idempotent() {
        let provider = Arc::new(MockBillingProvider::new());
        let bridge = bridge_with(provider.clone());

        let fresh = test_user(None, None, Plan::Free, None);
        let after_first = test_user(
            Some("cus_mock_1"),
            Some("sub_mock_1"),
            Plan::Free,
            Some(SubscriptionStatus::Incomplete),
        );
        let repo = repo_returning(vec![vec![after_first.clone()], vec![after_first.clone()]]);

        let (user, first) = bridge.begin_upgrade(&repo, fresh).await.unwrap();
        assert_eq!(first.subscription_id, "sub_mock_1");
        assert_eq!(provider.subscriptions_created(), 1);

        let (_, second) = bridge.begin_upgrade(&repo, user).await.unwrap();
        assert_eq!(second.subscription_id, "sub_mock_1");

        // The second call re-fetched instead of creating anything new
        assert_eq!(provider.customers_created(), 1);
        assert_eq!(provider.subscriptions_created(), 1);
        assert_eq!(provider.retrievals(), 1);
    }

    #[tokio::test]
    async fn test_begin_upgrade_keeps_plan_free() {
        let provider = Arc::new(MockBillingProvider::new());
        let bridge = bridge_with(provider);

        let after = test_user(
            Some("cus_mock_1"),
            Some("sub_mock_1"),
            Plan::Free,
            Some(SubscriptionStatus::Incomplete),
        );
        let repo = repo_returning(vec![vec![after]]);

        let (user, checkout) = bridge
            .begin_upgrade(&repo, test_user(None, None, Plan::Free, None))
            .await
            .unwrap();

        assert_eq!(user.plan(), Plan::Free);
        assert_eq!(checkout.status, SubscriptionStatus::Incomplete);
        assert!(checkout.client_token.is_some());
    }

    #[tokio::test]
    async fn test_provider_error_surfaces_without_retry() {
        let provider = Arc::new(MockBillingProvider::new());
        provider.fail_with("card network unavailable");
        let bridge = bridge_with(provider.clone());

        let repo = repo_returning(vec![]);
        let result = bridge
            .begin_upgrade(&repo, test_user(None, None, Plan::Free, None))
            .await;

        match result {
            Err(AppError::BillingProvider { message }) => {
                assert!(message.contains("card network unavailable"))
            }
            other => panic!("expected provider error, got {:?}", other.map(|_| ())),
        }

        // Exactly one attempt, no retry
        assert_eq!(provider.customers_created(), 1);
        assert_eq!(provider.subscriptions_created(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_grants_premium_only_when_live() {
        let provider = Arc::new(MockBillingProvider::new());
        let bridge = bridge_with(provider.clone());

        let pending = test_user(
            Some("cus_mock_1"),
            Some("sub_mock_1"),
            Plan::Free,
            Some(SubscriptionStatus::Incomplete),
        );

        // Provider still reports incomplete: stays free
        let repo = repo_returning(vec![vec![pending.clone()]]);
        let user = bridge.reconcile(&repo, pending.clone()).await.unwrap();
        assert_eq!(user.plan(), Plan::Free);

        // Provider now reports active: flips to premium
        provider.set_status(SubscriptionStatus::Active);
        let premium = test_user(
            Some("cus_mock_1"),
            Some("sub_mock_1"),
            Plan::Premium,
            Some(SubscriptionStatus::Active),
        );
        let repo = repo_returning(vec![vec![premium]]);
        let user = bridge.reconcile(&repo, pending).await.unwrap();
        assert_eq!(user.plan(), Plan::Premium);
    }

    #[tokio::test]
    async fn test_reconcile_downgrades_on_lapsed_subscription() {
        let provider = Arc::new(MockBillingProvider::new());
        provider.set_status(SubscriptionStatus::Canceled);
        let bridge = bridge_with(provider);

        let lapsed_premium = test_user(
            Some("cus_mock_1"),
            Some("sub_mock_1"),
            Plan::Premium,
            Some(SubscriptionStatus::Active),
        );
        let downgraded = test_user(
            Some("cus_mock_1"),
            Some("sub_mock_1"),
            Plan::Free,
            Some(SubscriptionStatus::Canceled),
        );
        let repo = repo_returning(vec![vec![downgraded]]);

        let user = bridge.reconcile(&repo, lapsed_premium).await.unwrap();
        assert_eq!(user.plan(), Plan::Free);
    }

    #[tokio::test]
    async fn test_reconcile_without_subscription_errors() {
        let bridge = bridge_with(Arc::new(MockBillingProvider::new()));
        let repo = repo_returning(vec![]);

        let result = bridge
            .reconcile(&repo, test_user(None, None, Plan::Free, None))
            .await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
    }
}

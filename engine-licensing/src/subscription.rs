//! Subscriptions offered by the store.
//!
//! The store API itself lives outside this crate; it is reached through a
//! [`SubscriptionSource`]. Descriptors returned by the store are not
//! verified here. Only the license bytes downloaded for a subscription are.

use serde::{Deserialize, Serialize};

/// State of a subscription that can no longer produce licenses.
pub const EXPIRED_STATE: &str = "expired";

/// Product id prefix shared by every engine subscription.
pub const ENGINE_PRODUCT_PREFIX: &str = "docker-ee";

/// Product id used when requesting a trial.
pub const TRIAL_PRODUCT_ID: &str = "docker-ee-trial";

/// Rate plan used when requesting a trial.
pub const TRIAL_RATE_PLAN: &str = "free-trial";

/// Summary of a subscription as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    pub name: String,
    pub subscription_id: String,
    /// e.g. `active` or `expired`.
    pub state: String,
    pub product_id: String,
}

impl SubscriptionDescriptor {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state == EXPIRED_STATE
    }

    #[must_use]
    pub fn is_engine_product(&self) -> bool {
        self.product_id.starts_with(ENGINE_PRODUCT_PREFIX)
    }

    /// Returns true if a license for this subscription can be installed.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.is_expired() && self.is_engine_product()
    }
}

/// Keeps the non-expired engine subscriptions, preserving order.
pub fn eligible_subscriptions<I>(subscriptions: I) -> Vec<SubscriptionDescriptor>
where
    I: IntoIterator<Item = SubscriptionDescriptor>,
{
    subscriptions
        .into_iter()
        .filter(SubscriptionDescriptor::is_eligible)
        .collect()
}

/// End-user agreement acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eusa {
    pub accepted: bool,
}

/// Request body for generating a trial subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRequest {
    pub docker_id: String,
    pub eusa: Eusa,
    pub name: String,
    pub pricing_components: Vec<String>,
    pub product_id: String,
    pub product_rate_plan: String,
}

impl TrialRequest {
    /// Builds a free-trial request for `account_id` with the EUSA accepted.
    #[must_use]
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            docker_id: account_id.into(),
            eusa: Eusa { accepted: true },
            name: name.into(),
            pricing_components: Vec::new(),
            product_id: TRIAL_PRODUCT_ID.to_string(),
            product_rate_plan: TRIAL_RATE_PLAN.to_string(),
        }
    }
}

/// The remote subscription API.
pub trait SubscriptionSource {
    type Error: std::error::Error;

    /// Lists every subscription visible to `account_id`.
    fn list_subscriptions(
        &self,
        account_id: &str,
    ) -> Result<Vec<SubscriptionDescriptor>, Self::Error>;

    /// Creates a trial subscription.
    fn create_trial(&self, request: &TrialRequest) -> Result<SubscriptionDescriptor, Self::Error>;

    /// Downloads the raw license file of a subscription.
    fn download_license(&self, subscription_id: &str) -> Result<Vec<u8>, Self::Error>;
}

/// Lists the subscriptions of `account_id` whose licenses can be installed.
pub fn available_subscriptions<S>(
    source: &S,
    account_id: &str,
) -> Result<Vec<SubscriptionDescriptor>, S::Error>
where
    S: SubscriptionSource + ?Sized,
{
    source
        .list_subscriptions(account_id)
        .map(eligible_subscriptions)
}

/// Requests a trial for `account_id` and downloads its license file.
pub fn generate_trial_license<S>(
    source: &S,
    account_id: &str,
    trial_name: &str,
) -> Result<Vec<u8>, S::Error>
where
    S: SubscriptionSource + ?Sized,
{
    let subscription = source.create_trial(&TrialRequest::new(account_id, trial_name))?;
    source.download_license(&subscription.subscription_id)
}

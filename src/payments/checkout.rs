use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config;
use crate::ledger::PricingTier;

/// Thin client for the payment processor's REST API (form-encoded, bearer
/// auth). Only the two session-creation calls and a customer lookup are
/// needed; webhook ingestion is the other half of the integration.
pub struct PaymentProviderClient {
    base: String,
    secret_key: String,
    client: Client,
}

impl PaymentProviderClient {
    pub fn from_env() -> Self {
        Self::new(
            config::PAYMENT_API_BASE.clone(),
            config::PAYMENT_API_KEY.clone(),
        )
    }

    pub fn new(base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("client build"),
        }
    }

    async fn post_form(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        let url = format!("{}/v1/{}", self.base, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Create a provider-side customer carrying our user id in metadata.
    pub async fn create_customer(&self, user_id: &str) -> Result<String> {
        let params = vec![("metadata[userId]".to_string(), user_id.to_string())];
        let value = self.post_form("customers", &params).await?;
        value["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("customer creation response missing id"))
    }

    /// Whether a stored customer reference still exists on the provider side.
    /// Stale refs happen when the provider environment is switched.
    pub async fn customer_exists(&self, customer_ref: &str) -> bool {
        let url = format!("{}/v1/customers/{}", self.base, customer_ref);
        match self.client.get(&url).bearer_auth(&self.secret_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Create a checkout session for the given tier and return its URL. The
    /// metadata round-trips through the checkout-completed webhook and is the
    /// only link between the provider event and our account.
    pub async fn create_checkout_session(
        &self,
        customer_ref: &str,
        user_id: &str,
        tier: PricingTier,
    ) -> Result<String> {
        let mode = if tier.is_recurring() { "subscription" } else { "payment" };
        let app_base = config::APP_BASE_URL.as_str();
        let mut params = vec![
            ("customer".to_string(), customer_ref.to_string()),
            ("mode".to_string(), mode.to_string()),
            ("line_items[0][price]".to_string(), tier.price_id()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "success_url".to_string(),
                format!("{app_base}/dashboard?success=true"),
            ),
            (
                "cancel_url".to_string(),
                format!("{app_base}/dashboard?canceled=true"),
            ),
            ("metadata[userId]".to_string(), user_id.to_string()),
            ("metadata[tier]".to_string(), tier.as_str().to_string()),
            (
                "metadata[credits]".to_string(),
                tier.credits().to_string(),
            ),
        ];
        if tier.is_recurring() {
            // Subscription metadata is what renewal invoices echo back.
            params.push((
                "subscription_data[metadata][userId]".to_string(),
                user_id.to_string(),
            ));
            params.push((
                "subscription_data[metadata][tier]".to_string(),
                tier.as_str().to_string(),
            ));
        }

        let value = self.post_form("checkout/sessions", &params).await?;
        value["url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("checkout session response missing url"))
    }

    /// Create a billing-portal session for subscription self-management.
    pub async fn create_portal_session(&self, customer_ref: &str) -> Result<String> {
        let params = vec![
            ("customer".to_string(), customer_ref.to_string()),
            (
                "return_url".to_string(),
                format!("{}/dashboard", config::APP_BASE_URL.as_str()),
            ),
        ];
        let value = self.post_form("billing_portal/sessions", &params).await?;
        value["url"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("portal session response missing url"))
    }
}

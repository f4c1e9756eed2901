use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use crate::config;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::ledger::{LedgerStore, PricingTier};

use super::checkout::PaymentProviderClient;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub tier: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub url: String,
}

/// POST /api/billing/checkout — create a provider checkout session for the
/// requested tier, provisioning the provider customer on first purchase.
pub async fn create_checkout(
    Extension(pool): Extension<PgPool>,
    Extension(provider): Extension<Arc<PaymentProviderClient>>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<SessionResponse>> {
    let tier = PricingTier::parse(&payload.tier)
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    let store = LedgerStore::new(pool);
    let (account, _) = store.create_account(&user_id, *config::TRIAL_CREDITS).await
        .map_err(|err| AppError::Message(err.to_string()))?;

    // Revalidate a stored customer ref; it goes stale when the provider
    // environment is switched between test and live.
    let mut customer_ref = account.payment_customer_ref;
    if let Some(existing) = customer_ref.as_deref() {
        if !provider.customer_exists(existing).await {
            info!(%user_id, customer = existing, "stored payment customer missing upstream; recreating");
            customer_ref = None;
        }
    }
    let customer_ref = match customer_ref {
        Some(existing) => existing,
        None => {
            let created = provider.create_customer(&user_id).await.map_err(|err| {
                error!(?err, %user_id, "failed to provision payment customer");
                AppError::BadGateway("payment customer provisioning failed".into())
            })?;
            store
                .set_payment_customer_ref(&user_id, &created)
                .await
                .map_err(|err| AppError::Message(err.to_string()))?;
            created
        }
    };

    let url = provider
        .create_checkout_session(&customer_ref, &user_id, tier)
        .await
        .map_err(|err| {
            error!(?err, %user_id, tier = tier.as_str(), "failed to create checkout session");
            AppError::BadGateway("checkout session creation failed".into())
        })?;

    Ok(Json(SessionResponse { url }))
}

/// POST /api/billing/portal — billing-portal session for an existing customer.
pub async fn create_portal(
    Extension(pool): Extension<PgPool>,
    Extension(provider): Extension<Arc<PaymentProviderClient>>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<SessionResponse>> {
    let store = LedgerStore::new(pool);
    let account = store
        .find_account(&user_id)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?
        .ok_or(AppError::NotFound)?;
    let customer_ref = account
        .payment_customer_ref
        .ok_or_else(|| AppError::BadRequest("no billing profile for this account".into()))?;

    let url = provider
        .create_portal_session(&customer_ref)
        .await
        .map_err(|err| {
            error!(?err, %user_id, "failed to create billing portal session");
            AppError::BadGateway("billing portal session creation failed".into())
        })?;

    Ok(Json(SessionResponse { url }))
}

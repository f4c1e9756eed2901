use axum::{extract::Extension, http::HeaderMap, Json};
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{error, info};

use crate::config;
use crate::error::{AppError, AppResult};
use crate::ledger::LedgerStore;
use crate::payments::{
    verify_identity_signature, verify_payment_signature, PaymentEvent, PaymentEventError,
    PaymentEventProcessor, ProcessOutcome,
};

/// POST /api/webhooks/payments — signed payment-processor events.
///
/// Verification failures are fatal for the delivery. Processing errors map to
/// non-2xx so the processor redelivers; duplicates are success-no-op thanks to
/// the ledger's idempotency gate, so redelivery is always safe.
pub async fn payment_webhook(
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let signature = headers
        .get("payment-signature")
        .or_else(|| headers.get("stripe-signature"))
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::BadRequest("Missing signature".into()))?;

    verify_payment_signature(
        config::PAYMENT_WEBHOOK_SECRET.as_str(),
        signature,
        &body,
        Utc::now().timestamp(),
        *config::WEBHOOK_TOLERANCE_SECS,
    )
    .map_err(|err| {
        error!(%err, "payment webhook signature rejected");
        AppError::Unauthorized
    })?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Malformed payload".into()))?;
    let event = PaymentEvent::from_payload(&payload);

    let outcome = PaymentEventProcessor::new(pool)
        .process(event)
        .await
        .map_err(|err| match err {
            // No payment-event record was written for these, so a corrected
            // redelivery can still be applied later.
            PaymentEventError::MissingMetadata(field) => {
                error!(field, "payment event missing required metadata");
                AppError::BadRequest(format!("missing metadata: {field}"))
            }
            PaymentEventError::UnknownTier(err) => {
                error!(%err, "payment event carried unknown tier");
                AppError::BadRequest(err.to_string())
            }
            PaymentEventError::Ledger(err) => AppError::Message(err.to_string()),
        })?;

    if let ProcessOutcome::Granted { user_id, credits, balance } = &outcome {
        info!(%user_id, credits, balance, "payment event granted credits");
    }
    Ok(Json(json!({ "received": true })))
}

/// POST /api/webhooks/identity — signed identity-provider events. Only
/// `user.created` is acted on; account creation is idempotent so redelivered
/// signups cannot double-grant the trial.
pub async fn identity_webhook(
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let msg_id = header_str(&headers, "svix-id")?;
    let timestamp = header_str(&headers, "svix-timestamp")?;
    let signature = header_str(&headers, "svix-signature")?;

    verify_identity_signature(
        config::IDENTITY_WEBHOOK_SECRET.as_str(),
        msg_id,
        timestamp,
        signature,
        &body,
    )
    .map_err(|err| {
        error!(%err, "identity webhook signature rejected");
        AppError::Unauthorized
    })?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Malformed payload".into()))?;
    let kind = payload["type"].as_str().unwrap_or_default();

    if kind == "user.created" {
        let user_id = payload["data"]["id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(AppError::BadRequest("Missing user id".into()))?;
        let (_, created) = LedgerStore::new(pool)
            .create_account(user_id, *config::TRIAL_CREDITS)
            .await
            .map_err(|err| AppError::Message(err.to_string()))?;
        if created {
            info!(user_id, "account created from identity webhook");
        } else {
            info!(user_id, "account already exists; signup event ignored");
        }
    }

    Ok(Json(json!({ "received": true })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {name} header")))
}

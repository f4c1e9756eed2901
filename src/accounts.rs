use axum::{extract::Extension, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::ledger::{Account, CreditGrant, CreditLedgerService, LedgerStore};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub account: Account,
    pub balance: i32,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i32,
}

/// GET /api/profile — returns the caller's account, creating it (with the
/// trial grant) on first contact.
pub async fn get_profile(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let ledger = CreditLedgerService::new(pool);
    let (account, _) = ledger
        .store()
        .create_account(&user_id, *config::TRIAL_CREDITS)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    let balance = ledger
        .balance(&user_id)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(ProfileResponse { account, balance }))
}

/// GET /api/profile/credits — live balance, summed from the grants.
pub async fn get_credits(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<CreditsResponse>> {
    let ledger = CreditLedgerService::new(pool);
    ledger
        .store()
        .create_account(&user_id, *config::TRIAL_CREDITS)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    let credits = ledger
        .balance(&user_id)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(CreditsResponse { credits }))
}

/// GET /api/profile/credit-history — every allocation, newest first.
pub async fn credit_history(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<Vec<CreditGrant>>> {
    let store = LedgerStore::new(pool.clone());
    if store
        .find_account(&user_id)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?
        .is_none()
    {
        return Err(AppError::NotFound);
    }
    let history = CreditLedgerService::new(pool)
        .credit_history(&user_id)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(history))
}

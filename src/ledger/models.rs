use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// One end-user account. `credits` is a denormalized cache of the sum of
/// `remaining` across the account's grants; the grant rows are the source
/// of truth and the cache is recomputed after every ledger mutation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub tier: String,
    pub credits: i32,
    pub subscription_status: String,
    pub payment_customer_ref: Option<String>,
    pub payment_subscription_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One credit allocation event (trial bonus, purchase, renewal). Immutable
/// except for `remaining`, which only ever decreases.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CreditGrant {
    pub id: Uuid,
    pub user_id: String,
    pub allocated: i32,
    pub remaining: i32,
    pub category: String,
    pub allocated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_ref: Option<String>,
    pub subscription_ref: Option<String>,
}

/// One processed payment notification. `payment_ref` is unique and serves as
/// the idempotency key for webhook redelivery.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    pub id: Uuid,
    pub payment_ref: String,
    pub customer_ref: Option<String>,
    pub tier: String,
    pub amount_cents: i32,
    pub credits_granted: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentEvent {
    pub payment_ref: String,
    pub customer_ref: Option<String>,
    pub tier: String,
    pub amount_cents: i32,
    pub credits_granted: i32,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("grant {0} has insufficient remaining balance")]
    InsufficientGrantBalance(Uuid),
    #[error("account {0} not found")]
    AccountNotFound(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

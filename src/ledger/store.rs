use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Account, CreditGrant, LedgerError, NewPaymentEvent, PaymentEventRecord};
use super::TRIAL_GRANT_CATEGORY;

/// Durable CRUD over accounts, credit grants and payment-event records.
/// All conditional arithmetic lives here: the single-statement decrement and
/// the insert-if-absent gate are the serialization points the upper layers
/// rely on.
#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent account creation. Only the caller that actually inserted the
    /// row writes the trial grant, so duplicate signup deliveries and the lazy
    /// first-contact path cannot double-grant. Account, trial grant and cached
    /// balance commit together: a failure mid-bootstrap rolls all three back,
    /// so a retry sees no account and grants the trial normally.
    pub async fn create_account(
        &self,
        user_id: &str,
        initial_grant: i32,
    ) -> Result<(Account, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query("INSERT INTO accounts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut tx)
            .await?
            .rows_affected()
            == 1;

        if inserted && initial_grant > 0 {
            sqlx::query(
                r#"
                INSERT INTO credit_grants (id, user_id, allocated, remaining, category)
                VALUES ($1, $2, $3, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(initial_grant)
            .bind(TRIAL_GRANT_CATEGORY)
            .execute(&mut tx)
            .await?;

            sqlx::query("UPDATE accounts SET credits = $2, updated_at = NOW() WHERE user_id = $1")
                .bind(user_id)
                .bind(initial_grant)
                .execute(&mut tx)
                .await?;
        }

        tx.commit().await?;

        let account = self
            .find_account(user_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        Ok((account, inserted))
    }

    pub async fn find_account(&self, user_id: &str) -> Result<Option<Account>, LedgerError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    /// Grants ordered oldest-first, ties broken by grant id so FIFO consumption
    /// is deterministic.
    pub async fn list_grants(
        &self,
        user_id: &str,
        only_with_remaining: bool,
    ) -> Result<Vec<CreditGrant>, LedgerError> {
        let query = if only_with_remaining {
            r#"
            SELECT * FROM credit_grants
            WHERE user_id = $1
              AND remaining > 0
              AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY allocated_at ASC, id ASC
            "#
        } else {
            "SELECT * FROM credit_grants WHERE user_id = $1 ORDER BY allocated_at ASC, id ASC"
        };
        let grants = sqlx::query_as::<_, CreditGrant>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(grants)
    }

    /// Atomic conditional decrement. The `remaining >= $2` predicate and the
    /// update execute as one statement, so concurrent callers can never drive
    /// a grant negative; the loser sees `InsufficientGrantBalance`.
    pub async fn decrement_grant_remaining(
        &self,
        grant_id: Uuid,
        by: i32,
    ) -> Result<i32, LedgerError> {
        let remaining: Option<i32> = sqlx::query_scalar(
            "UPDATE credit_grants SET remaining = remaining - $2 WHERE id = $1 AND remaining >= $2 RETURNING remaining",
        )
        .bind(grant_id)
        .bind(by)
        .fetch_optional(&self.pool)
        .await?;

        remaining.ok_or(LedgerError::InsufficientGrantBalance(grant_id))
    }

    pub async fn insert_grant(
        &self,
        user_id: &str,
        amount: i32,
        category: &str,
        payment_ref: Option<&str>,
        subscription_ref: Option<&str>,
    ) -> Result<CreditGrant, LedgerError> {
        let grant = sqlx::query_as::<_, CreditGrant>(
            r#"
            INSERT INTO credit_grants (id, user_id, allocated, remaining, category, payment_ref, subscription_ref)
            VALUES ($1, $2, $3, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(category)
        .bind(payment_ref)
        .bind(subscription_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(grant)
    }

    pub async fn set_cached_balance(&self, user_id: &str, value: i32) -> Result<(), LedgerError> {
        sqlx::query("UPDATE accounts SET credits = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_payment_event_by_external_id(
        &self,
        payment_ref: &str,
    ) -> Result<Option<PaymentEventRecord>, LedgerError> {
        let record = sqlx::query_as::<_, PaymentEventRecord>(
            "SELECT * FROM payment_events WHERE payment_ref = $1",
        )
        .bind(payment_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Single-statement insert-or-detect-conflict on the unique payment
    /// reference. Returns `false` when the event was already recorded, which
    /// makes this the idempotency gate for redelivered webhooks.
    pub async fn insert_payment_event_if_absent(
        &self,
        event: &NewPaymentEvent,
    ) -> Result<bool, LedgerError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_events (id, payment_ref, customer_ref, tier, amount_cents, credits_granted)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payment_ref) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.payment_ref)
        .bind(&event.customer_ref)
        .bind(&event.tier)
        .bind(event.amount_cents)
        .bind(event.credits_granted)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;
        Ok(inserted)
    }

    pub async fn set_subscription_state(
        &self,
        user_id: &str,
        status: &str,
        subscription_ref: Option<&str>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE accounts SET subscription_status = $2, payment_subscription_ref = $3, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(status)
        .bind(subscription_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_payment_customer_ref(
        &self,
        user_id: &str,
        customer_ref: &str,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE accounts SET payment_customer_ref = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(customer_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_tier(&self, user_id: &str, tier: &str) -> Result<(), LedgerError> {
        sqlx::query("UPDATE accounts SET tier = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(tier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

use sqlx::PgPool;
use tracing::warn;

use super::models::{CreditGrant, LedgerError};
use super::store::LedgerStore;

/// Business-level operations over the ledger store. This is the only component
/// that changes a balance; both the generation path and the payment path go
/// through it.
#[derive(Clone)]
pub struct CreditLedgerService {
    store: LedgerStore,
}

impl CreditLedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: LedgerStore::new(pool),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Authoritative balance: the sum of `remaining` across non-expired
    /// grants. Always computed from the grant rows, never read from the
    /// cached column, so a caller sees its own just-committed mutations.
    pub async fn balance(&self, user_id: &str) -> Result<i32, LedgerError> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(remaining) FROM credit_grants
            WHERE user_id = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(user_id)
        .fetch_one(self.store.pool())
        .await?;
        Ok(total.unwrap_or(0) as i32)
    }

    /// Consume one credit from the oldest grant that still has balance.
    ///
    /// The candidate list is advisory; the store's conditional decrement is
    /// the authoritative check. If a concurrent caller drains a candidate
    /// between the read and the update we simply move on to the next oldest,
    /// and only when every candidate is exhausted do we report
    /// `InsufficientCredits`. This closes the check-then-use race without any
    /// cross-row locking.
    pub async fn deduct_one(&self, user_id: &str) -> Result<i32, LedgerError> {
        let candidates = self.store.list_grants(user_id, true).await?;
        for grant in candidates {
            match self.store.decrement_grant_remaining(grant.id, 1).await {
                Ok(_) => return self.refresh_cached_balance(user_id).await,
                Err(LedgerError::InsufficientGrantBalance(id)) => {
                    warn!(%user_id, grant = %id, "grant drained concurrently; trying next oldest");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(LedgerError::InsufficientCredits)
    }

    /// Record a new allocation and refresh the cached total. Grants and
    /// deductions target distinct rows, so interleaving them loses neither
    /// effect; the shared cached total is always recomputed from the grants.
    pub async fn grant(
        &self,
        user_id: &str,
        amount: i32,
        category: &str,
        payment_ref: Option<&str>,
        subscription_ref: Option<&str>,
    ) -> Result<i32, LedgerError> {
        self.store
            .insert_grant(user_id, amount, category, payment_ref, subscription_ref)
            .await?;
        self.refresh_cached_balance(user_id).await
    }

    /// All allocations for an account, newest first.
    pub async fn credit_history(&self, user_id: &str) -> Result<Vec<CreditGrant>, LedgerError> {
        let grants = sqlx::query_as::<_, CreditGrant>(
            "SELECT * FROM credit_grants WHERE user_id = $1 ORDER BY allocated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(grants)
    }

    async fn refresh_cached_balance(&self, user_id: &str) -> Result<i32, LedgerError> {
        let total = self.balance(user_id).await?;
        self.store.set_cached_balance(user_id, total).await?;
        Ok(total)
    }
}

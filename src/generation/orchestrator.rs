use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::emojis::Emoji;
use crate::ledger::{CreditLedgerService, LedgerError};

use super::inference::InferenceClient;
use super::storage::ObjectStore;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("storage failed: {0}")]
    StorageFailed(String),
    #[error("persistence failed: {0}")]
    PersistenceFailed(sqlx::Error),
    #[error(transparent)]
    Ledger(LedgerError),
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub emoji: Emoji,
    pub balance: i32,
    /// False on the rare race where the last credit was spent elsewhere
    /// between the balance check and the deduction; the artifact is kept.
    pub charged: bool,
}

/// The only path by which a user spends a credit to produce an emoji.
///
/// The sequence spans two external systems, so it cannot be one atomic
/// transaction. Instead it is ordered so that nothing the user could be
/// charged for is lost: all external work happens before the artifact row,
/// and the credit is deducted only after the row exists. A failed insert
/// triggers a best-effort compensating delete of the uploaded object.
pub struct GenerationOrchestrator {
    pool: PgPool,
    ledger: CreditLedgerService,
    inference: Arc<dyn InferenceClient>,
    storage: Arc<dyn ObjectStore>,
}

impl GenerationOrchestrator {
    pub fn new(
        pool: PgPool,
        inference: Arc<dyn InferenceClient>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            ledger: CreditLedgerService::new(pool.clone()),
            pool,
            inference,
            storage,
        }
    }

    pub async fn generate(
        &self,
        user_id: &str,
        prompt: &str,
    ) -> Result<GenerationOutcome, GenerationError> {
        // Advisory pre-check; the authoritative check is the atomic per-grant
        // decrement at deduction time. Failing here avoids any external call.
        let balance = self
            .ledger
            .balance(user_id)
            .await
            .map_err(GenerationError::Ledger)?;
        if balance <= 0 {
            return Err(GenerationError::InsufficientCredits);
        }

        let image_url = self
            .inference
            .generate(prompt)
            .await
            .map_err(|err| GenerationError::GenerationFailed(err.to_string()))?;
        let bytes = self
            .inference
            .fetch_image(&image_url)
            .await
            .map_err(|err| GenerationError::GenerationFailed(err.to_string()))?;

        let key = object_key(user_id);
        let public_url = self
            .storage
            .upload(&key, bytes, "image/png")
            .await
            .map_err(|err| GenerationError::StorageFailed(err.to_string()))?;

        let emoji = match self.insert_emoji(user_id, prompt, &public_url).await {
            Ok(emoji) => emoji,
            Err(err) => {
                if let Err(cleanup) = self.storage.delete(&key).await {
                    // The one accepted inconsistency: an orphaned object, in
                    // exchange for never charging for a missing artifact.
                    error!(?cleanup, key, "compensating delete failed; object orphaned");
                }
                return Err(GenerationError::PersistenceFailed(err));
            }
        };

        let (balance, charged) = match self.ledger.deduct_one(user_id).await {
            Ok(balance) => (balance, true),
            Err(err) => {
                // Revoking a delivered artifact is worse than an occasional
                // uncharged generation, so the emoji is kept either way.
                warn!(?err, %user_id, emoji = emoji.id, "credit deduction failed after generation; artifact kept");
                let balance = self.ledger.balance(user_id).await.unwrap_or(0);
                (balance, false)
            }
        };

        Ok(GenerationOutcome {
            emoji,
            balance,
            charged,
        })
    }

    async fn insert_emoji(
        &self,
        user_id: &str,
        prompt: &str,
        image_url: &str,
    ) -> Result<Emoji, sqlx::Error> {
        sqlx::query_as::<_, Emoji>(
            r#"
            INSERT INTO emojis (user_id, prompt, image_url)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(prompt)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await
    }
}

/// Collision-resistant, owner-scoped object key.
fn object_key(user_id: &str) -> String {
    format!(
        "emoji/{}/{}-{}.png",
        user_id,
        Utc::now().timestamp_millis(),
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_are_owner_scoped_and_unique() {
        let a = object_key("user_1");
        let b = object_key("user_1");
        assert!(a.starts_with("emoji/user_1/"));
        assert!(a.ends_with(".png"));
        assert_ne!(a, b);
    }
}

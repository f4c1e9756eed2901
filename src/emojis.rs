use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::generation::{GenerationError, GenerationOrchestrator};
use crate::ledger::LedgerStore;

/// One generated artifact. Mutated only through like-count and folder
/// assignment after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Emoji {
    pub id: i64,
    pub user_id: String,
    pub prompt: String,
    pub image_url: String,
    pub likes_count: i32,
    pub is_public: bool,
    pub credits_spent: i32,
    pub folder_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EmojiView {
    #[serde(flatten)]
    pub emoji: Emoji,
    pub is_liked: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub emoji: Emoji,
    pub balance: i32,
    pub charged: bool,
}

/// POST /api/generate — spend one credit to produce an emoji.
pub async fn generate_emoji(
    Extension(pool): Extension<PgPool>,
    Extension(orchestrator): Extension<Arc<GenerationOrchestrator>>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<GenerateResponse>)> {
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Prompt is required".into()));
    }

    // Lazy provisioning: first authenticated contact creates the account
    // (with its trial grant) if the signup webhook hasn't yet.
    LedgerStore::new(pool)
        .create_account(&user_id, *config::TRIAL_CREDITS)
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;

    let outcome = orchestrator
        .generate(&user_id, prompt)
        .await
        .map_err(|err| match err {
            GenerationError::InsufficientCredits => {
                AppError::PaymentRequired("insufficient credits".into())
            }
            GenerationError::GenerationFailed(reason) => {
                error!(%user_id, reason, "emoji generation failed");
                AppError::BadGateway("generation failed, try again".into())
            }
            GenerationError::StorageFailed(reason) => {
                error!(%user_id, reason, "image storage failed");
                AppError::BadGateway("storage failed, try again".into())
            }
            GenerationError::PersistenceFailed(db) => AppError::Db(db),
            GenerationError::Ledger(ledger) => AppError::Message(ledger.to_string()),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            emoji: outcome.emoji,
            balance: outcome.balance,
            charged: outcome.charged,
        }),
    ))
}

/// GET /api/emojis — the caller's emojis, newest first, with like flags.
pub async fn list_emojis(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<Vec<EmojiView>>> {
    let emojis = sqlx::query_as::<_, Emoji>(
        "SELECT * FROM emojis WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(&user_id)
    .fetch_all(&pool)
    .await?;

    let liked: HashSet<i64> = sqlx::query("SELECT emoji_id FROM emoji_likes WHERE user_id = $1")
        .bind(&user_id)
        .fetch_all(&pool)
        .await?
        .into_iter()
        .map(|row| row.get::<i64, _>("emoji_id"))
        .collect();

    let views = emojis
        .into_iter()
        .map(|emoji| {
            let is_liked = liked.contains(&emoji.id);
            EmojiView { emoji, is_liked }
        })
        .collect();
    Ok(Json(views))
}

/// DELETE /api/emojis/:id — ownership re-verified; likes cascade via FK.
pub async fn delete_emoji(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let deleted = sqlx::query("DELETE FROM emojis WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(&user_id)
        .execute(&pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SetFolderRequest {
    pub folder_id: Option<Uuid>,
}

/// PATCH /api/emojis/:id/folder — move an emoji into (or out of) a folder.
/// Both the emoji and the target folder must belong to the caller.
pub async fn set_emoji_folder(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<SetFolderRequest>,
) -> AppResult<Json<Emoji>> {
    if let Some(folder_id) = payload.folder_id {
        let owned: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM folders WHERE id = $1 AND user_id = $2")
                .bind(folder_id)
                .bind(&user_id)
                .fetch_optional(&pool)
                .await?;
        if owned.is_none() {
            return Err(AppError::NotFound);
        }
    }

    let emoji = sqlx::query_as::<_, Emoji>(
        "UPDATE emojis SET folder_id = $3 WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(id)
    .bind(&user_id)
    .bind(payload.folder_id)
    .fetch_optional(&pool)
    .await?;

    emoji.map(Json).ok_or(AppError::NotFound)
}

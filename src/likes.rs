use axum::{
    extract::{Extension, Path},
    http::StatusCode,
};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;

/// POST /api/emojis/:id/like — idempotent: liking twice is a no-op, and the
/// counter only moves when the pair row was actually inserted.
pub async fn like_emoji(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(emoji_id): Path<i64>,
) -> AppResult<StatusCode> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM emojis WHERE id = $1")
        .bind(emoji_id)
        .fetch_optional(&pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    // Pair row and counter move in one commit so the denormalized count
    // cannot drift from the pair rows.
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        "INSERT INTO emoji_likes (user_id, emoji_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(&user_id)
    .bind(emoji_id)
    .execute(&mut tx)
    .await?
    .rows_affected();

    if inserted == 1 {
        sqlx::query("UPDATE emojis SET likes_count = likes_count + 1 WHERE id = $1")
            .bind(emoji_id)
            .execute(&mut tx)
            .await?;
    }
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/emojis/:id/like
pub async fn unlike_emoji(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(emoji_id): Path<i64>,
) -> AppResult<StatusCode> {
    let mut tx = pool.begin().await?;
    let removed = sqlx::query("DELETE FROM emoji_likes WHERE user_id = $1 AND emoji_id = $2")
        .bind(&user_id)
        .bind(emoji_id)
        .execute(&mut tx)
        .await?
        .rows_affected();

    if removed == 1 {
        sqlx::query(
            "UPDATE emojis SET likes_count = likes_count - 1 WHERE id = $1 AND likes_count > 0",
        )
        .bind(emoji_id)
        .execute(&mut tx)
        .await?;
    }
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

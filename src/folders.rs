use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Folder {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

pub async fn list_folders(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
) -> AppResult<Json<Vec<Folder>>> {
    let folders = sqlx::query_as::<_, Folder>(
        "SELECT * FROM folders WHERE user_id = $1 ORDER BY created_at ASC",
    )
    .bind(&user_id)
    .fetch_all(&pool)
    .await?;
    Ok(Json(folders))
}

pub async fn create_folder(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<CreateFolderRequest>,
) -> AppResult<(StatusCode, Json<Folder>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Folder name is required".into()));
    }

    let result = sqlx::query_as::<_, Folder>(
        "INSERT INTO folders (id, user_id, name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&user_id)
    .bind(name)
    .fetch_one(&pool)
    .await;

    match result {
        Ok(folder) => Ok((StatusCode::CREATED, Json(folder))),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("folders_user_id_name_key") {
                    return Err(AppError::BadRequest("Folder already exists".into()));
                }
            }
            Err(AppError::Db(e))
        }
    }
}

/// Deleting a folder leaves its emojis in place; the FK clears their
/// assignment.
pub async fn delete_folder(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let deleted = sqlx::query("DELETE FROM folders WHERE id = $1 AND user_id = $2")
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

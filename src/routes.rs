use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::{accounts, emojis, folders, likes, payments, webhooks};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/generate", post(emojis::generate_emoji))
        .route("/api/emojis", get(emojis::list_emojis))
        .route("/api/emojis/:id", delete(emojis::delete_emoji))
        .route("/api/emojis/:id/folder", patch(emojis::set_emoji_folder))
        .route(
            "/api/emojis/:id/like",
            post(likes::like_emoji).delete(likes::unlike_emoji),
        )
        .route(
            "/api/folders",
            get(folders::list_folders).post(folders::create_folder),
        )
        .route("/api/folders/:id", delete(folders::delete_folder))
        .route("/api/profile", get(accounts::get_profile))
        .route("/api/profile/credits", get(accounts::get_credits))
        .route("/api/profile/credit-history", get(accounts::credit_history))
        .route("/api/billing/checkout", post(payments::api::create_checkout))
        .route("/api/billing/portal", post(payments::api::create_portal))
        .route("/api/webhooks/payments", post(webhooks::payment_webhook))
        .route("/api/webhooks/identity", post(webhooks::identity_webhook))
}

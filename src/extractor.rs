use axum::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Authenticated caller identity. Authentication itself is delegated to the external
/// identity provider; its proxy terminates the session and forwards the stable opaque
/// user id in `x-auth-user`, stripping any client-supplied value. When
/// `IDENTITY_PROXY_SECRET` is configured the proxy also sends `x-auth-proof`, an
/// HMAC-SHA256 of the user id, which we verify before trusting the header.
pub struct AuthUser {
    pub user_id: String,
}

pub fn verify_proof(user_id: &str, proof: &str, secret: &str) -> bool {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can use any key length");
    mac.update(user_id.as_bytes());
    match hex::decode(proof) {
        Ok(raw) => mac.verify_slice(&raw).is_ok(),
        Err(_) => false,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-auth-user")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing identity".into()))?;

        if let Some(secret) = crate::config::IDENTITY_PROXY_SECRET.as_deref() {
            let proof = parts
                .headers
                .get("x-auth-proof")
                .and_then(|value| value.to_str().ok())
                .ok_or((StatusCode::UNAUTHORIZED, "Missing identity proof".into()))?;
            if !verify_proof(&user_id, proof, secret) {
                return Err((StatusCode::UNAUTHORIZED, "Invalid identity proof".into()));
            }
        }

        Ok(AuthUser { user_id })
    }
}

use once_cell::sync::Lazy;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// Credits granted to every newly created account. Defaults to `3`.
pub static TRIAL_CREDITS: Lazy<i32> = Lazy::new(|| {
    std::env::var("TRIAL_CREDITS")
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .filter(|value| *value >= 0)
        .unwrap_or(3)
});

/// Shared secret for verifying payment-processor webhook signatures.
/// Must be set via the `PAYMENT_WEBHOOK_SECRET` env variable.
pub static PAYMENT_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("PAYMENT_WEBHOOK_SECRET").expect("PAYMENT_WEBHOOK_SECRET must be set")
});

/// Shared secret for verifying identity-provider webhook signatures.
/// Must be set via the `IDENTITY_WEBHOOK_SECRET` env variable.
pub static IDENTITY_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("IDENTITY_WEBHOOK_SECRET").expect("IDENTITY_WEBHOOK_SECRET must be set")
});

/// Maximum age (seconds) accepted for a signed webhook timestamp. Defaults to `300`.
pub static WEBHOOK_TOLERANCE_SECS: Lazy<i64> = Lazy::new(|| {
    std::env::var("WEBHOOK_TOLERANCE_SECS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(300)
});

/// Optional shared secret for the identity proxy's `x-auth-proof` header. When unset,
/// the proxy-supplied user id header is trusted as-is.
pub static IDENTITY_PROXY_SECRET: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("IDENTITY_PROXY_SECRET"));

/// Base URL of the payment processor API.
pub static PAYMENT_API_BASE: Lazy<String> = Lazy::new(|| {
    std::env::var("PAYMENT_API_BASE").unwrap_or_else(|_| "https://api.stripe.com".to_string())
});

/// API key used when calling the payment processor.
pub static PAYMENT_API_KEY: Lazy<String> =
    Lazy::new(|| std::env::var("PAYMENT_API_KEY").expect("PAYMENT_API_KEY must be set"));

/// Provider price reference for the one-time starter pack.
pub static PRICE_ID_STARTER_PACK: Lazy<String> =
    Lazy::new(|| std::env::var("PRICE_ID_STARTER_PACK").unwrap_or_default());

/// Provider price reference for the one-time pro pack.
pub static PRICE_ID_PRO_PACK: Lazy<String> =
    Lazy::new(|| std::env::var("PRICE_ID_PRO_PACK").unwrap_or_default());

/// Provider price reference for the monthly subscription.
pub static PRICE_ID_PRO_MONTHLY: Lazy<String> =
    Lazy::new(|| std::env::var("PRICE_ID_PRO_MONTHLY").unwrap_or_default());

/// Public base URL of the web app, used for checkout redirect targets.
pub static APP_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
});

/// Base URL of the text-to-image inference API.
pub static INFERENCE_API_BASE: Lazy<String> = Lazy::new(|| {
    std::env::var("INFERENCE_API_BASE").unwrap_or_else(|_| "https://api.replicate.com".to_string())
});

/// Token used when calling the inference API.
pub static INFERENCE_API_TOKEN: Lazy<String> =
    Lazy::new(|| std::env::var("INFERENCE_API_TOKEN").expect("INFERENCE_API_TOKEN must be set"));

/// Model version pinned for emoji generation.
pub static INFERENCE_MODEL_VERSION: Lazy<String> = Lazy::new(|| {
    std::env::var("INFERENCE_MODEL_VERSION").unwrap_or_else(|_| {
        "dee76b5afde21b0f01ed7925f0665b7e879c50ee718c5f78a9d38e04d523cc5e".to_string()
    })
});

/// Timeout (seconds) for inference and storage calls. Defaults to `60`.
pub static GENERATION_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("GENERATION_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(60)
});

/// Endpoint of the S3-compatible object store.
pub static STORAGE_ENDPOINT: Lazy<String> = Lazy::new(|| {
    std::env::var("STORAGE_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string())
});

/// Bucket that holds generated images.
pub static STORAGE_BUCKET: Lazy<String> =
    Lazy::new(|| std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "emojis".to_string()));

/// Optional base URL for public object links. Falls back to `STORAGE_ENDPOINT/STORAGE_BUCKET`.
/// Supports `{bucket}`/`{key}` templating for CDN-fronted buckets.
pub static STORAGE_PUBLIC_BASE_URL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("STORAGE_PUBLIC_BASE_URL"));

/// Optional bearer token presented to the object store.
pub static STORAGE_ACCESS_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("STORAGE_ACCESS_TOKEN"));

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;

use crate::config;

/// External blob store boundary: upload returns a public URL, delete is the
/// best-effort compensating call only.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-compatible bucket reached over plain HTTP PUT/DELETE.
pub struct HttpBucketStore {
    endpoint: String,
    bucket: String,
    public_base: String,
    token: Option<String>,
    client: Client,
}

impl HttpBucketStore {
    pub fn from_env() -> Self {
        Self::new(
            config::STORAGE_ENDPOINT.clone(),
            config::STORAGE_BUCKET.clone(),
            config::STORAGE_PUBLIC_BASE_URL.clone(),
            config::STORAGE_ACCESS_TOKEN.clone(),
        )
    }

    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        public_base: Option<String>,
        token: Option<String>,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let bucket = bucket.into();
        let public_base = public_base.unwrap_or_else(|| endpoint.clone());
        Self {
            endpoint,
            bucket,
            public_base,
            token,
            client: Client::builder()
                .timeout(Duration::from_secs(*config::GENERATION_TIMEOUT_SECS))
                .build()
                .expect("client build"),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpBucketStore {
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        let mut req = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = self.token.as_deref() {
            req = req.bearer_auth(token);
        }
        req.send().await?.error_for_status()?;
        Ok(build_public_url(&self.public_base, &self.bucket, key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut req = self.client.delete(self.object_url(key));
        if let Some(token) = self.token.as_deref() {
            req = req.bearer_auth(token);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Build the public URL for a stored object.
pub fn build_public_url(base: &str, bucket: &str, key: &str) -> String {
    let trimmed = base.trim_end_matches('/');

    // Allow simple templating: https://host/{bucket}/{key} or https://bucket.host/{key}
    if trimmed.contains("{bucket}") || trimmed.contains("{key}") {
        return trimmed.replace("{bucket}", bucket).replace("{key}", key);
    }

    // If the base already includes the bucket, append only the key.
    if trimmed.contains(bucket) {
        format!("{}/{}", trimmed, key)
    } else {
        format!("{}/{}/{}", trimmed, bucket, key)
    }
}

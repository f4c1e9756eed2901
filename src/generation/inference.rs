use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config;

/// Black-box text-to-image call. One bounded-timeout attempt, no retries;
/// retry decisions belong to the caller.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run the model and return the URL of the rendered image.
    async fn generate(&self, prompt: &str) -> Result<String>;
    /// Download the rendered image bytes.
    async fn fetch_image(&self, url: &str) -> Result<Bytes>;
}

/// Replicate-style synchronous prediction client.
pub struct HttpInferenceClient {
    base: String,
    token: String,
    model_version: String,
    client: Client,
}

impl HttpInferenceClient {
    pub fn from_env() -> Self {
        Self::new(
            config::INFERENCE_API_BASE.clone(),
            config::INFERENCE_API_TOKEN.clone(),
            config::INFERENCE_MODEL_VERSION.clone(),
        )
    }

    pub fn new(
        base: impl Into<String>,
        token: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            model_version: model_version.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(*config::GENERATION_TIMEOUT_SECS))
                .build()
                .expect("client build"),
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/predictions", self.base);
        let body = json!({
            "version": self.model_version,
            "input": {
                "prompt": format!("A TOK emoji of {prompt}"),
                "apply_watermark": false,
            }
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let value: Value = resp.json().await?;

        // Output is either a bare URL string or an array of URLs.
        let output = &value["output"];
        let image_url = output
            .as_str()
            .or_else(|| output.get(0).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty());
        image_url
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("prediction response carried no output image"))
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            bail!("image download returned an empty body");
        }
        Ok(bytes)
    }
}

//! Inference service client. One prompt in, one completion out; the caller
//! owns all interpretation of the returned text.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[async_trait]
pub trait Inference: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}

pub struct HttpInference {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    response: String,
}

impl HttpInference {
    pub fn new(cfg: &souk_config::Inference) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
        })
    }
}

#[async_trait]
impl Inference for HttpInference {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": 0 },
            }))
            .send()
            .await
            .map_err(|e| format!("inference request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "inference request returned status {}",
                response.status()
            ));
        }

        let body: CompletionBody = response
            .json()
            .await
            .map_err(|e| format!("invalid inference response: {e}"))?;
        Ok(body.response)
    }
}

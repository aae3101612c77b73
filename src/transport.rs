use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    adapter::{GenerationRequest, ResponseBatch},
    config::AppConfig,
    error::AdapterError,
};

/// Delivers a payload to the inference server and returns its raw response.
#[async_trait]
pub trait CompletionsTransport: Send + Sync {
    async fn send(&self, request: &GenerationRequest) -> Result<ResponseBatch, AdapterError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AdapterError> {
        Self::new(config.endpoint_url(), config.eval_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionsTransport for HttpTransport {
    async fn send(&self, request: &GenerationRequest) -> Result<ResponseBatch, AdapterError> {
        debug!(endpoint = %self.endpoint, model = %request.model, "sending completions request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Transport(format!(
                "inference server returned {status}: {body}"
            )));
        }

        response
            .json::<ResponseBatch>()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
    }
}

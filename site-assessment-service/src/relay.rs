use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::errors::AssessError;
use crate::models::AnalysisResult;
use crate::prompt::AnalysisRequest;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("upstream call failed (status {status:?}): {details}")]
    Upstream { status: Option<u16>, details: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Upstream {
            status: err.status().map(|s| s.as_u16()),
            details: err.to_string(),
        }
    }
}

impl From<RelayError> for AssessError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Upstream { status, details } => AssessError::Upstream { status, details },
            RelayError::Internal(err) => AssessError::Internal(err),
        }
    }
}

/// A hosted chat-completion model that accepts text and inline images.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends one user message and returns the text of the first completion.
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, RelayError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Option<Duration>,
}

impl OpenAiSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
        }
    }
}

/// Chat-completions client for OpenAI and compatible APIs.
pub struct OpenAiClient {
    http: Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, RelayError> {
        let payload = json!({
            "model": self.settings.model,
            "messages": [
                {
                    "role": "user",
                    "content": serde_json::to_value(request).map_err(anyhow::Error::from)?
                }
            ],
            "max_tokens": self.settings.max_tokens
        });

        debug!(
            model = %self.settings.model,
            parts = request.parts().len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RelayError::Upstream {
                status: Some(status.as_u16()),
                details: body,
            });
        }

        let response_json: Value =
            serde_json::from_str(&body).map_err(|e| RelayError::Upstream {
                status: Some(status.as_u16()),
                details: format!("response body is not JSON: {e}"),
            })?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| RelayError::Upstream {
                status: Some(status.as_u16()),
                details: "Invalid response format from LLM".to_string(),
            })?;

        Ok(content.to_string())
    }
}

/// Sends built requests to the completion service and packages the result.
#[derive(Clone)]
pub struct AnalysisRelay {
    service: Arc<dyn CompletionService>,
}

impl AnalysisRelay {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }

    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        filenames: Vec<String>,
    ) -> Result<AnalysisResult, AssessError> {
        let markdown_text = self.service.complete(request).await?;

        info!(
            files = filenames.len(),
            characters = markdown_text.len(),
            "Received assessment report"
        );

        Ok(AnalysisResult {
            markdown_text,
            source_filenames: filenames,
        })
    }
}

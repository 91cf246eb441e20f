use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http_client::anthropic_client;
use super::prompts::{build_rename_prompt, RENAME_SYSTEM_PROMPT};
use super::rate_limit::RenameRateLimiter;
use crate::sorter::naming::{ExternalRenamer, RenamerError};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";

/// Model used for renames
const RENAME_MODEL: &str = "claude-3-5-haiku-latest";

/// Message in conversation
#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

/// API request body
#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

/// Content block in API response
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// API response body
#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

/// API error response
#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Renamer backed by the Anthropic Messages API
pub struct AnthropicRenamer {
    api_key: String,
    endpoint: String,
    limiter: RenameRateLimiter,
}

impl AnthropicRenamer {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            endpoint: ANTHROPIC_API_URL.to_string(),
            limiter: RenameRateLimiter::default(),
        }
    }

    /// Point at a different endpoint (proxies, tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_limiter(mut self, limiter: RenameRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    async fn send_message(&self, user_message: String) -> Result<String, RenamerError> {
        let request = ApiRequest {
            model: RENAME_MODEL,
            max_tokens: 100,
            system: RENAME_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: user_message,
            }],
        };

        let response = anthropic_client()
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| RenamerError::Request(format!("Request failed: {}", e)))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RenamerError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&error_text) {
                return Err(RenamerError::Request(format!("API error: {}", api_error.error.message)));
            }
            return Err(RenamerError::Request(format!("API error ({}): {}", status, error_text)));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| RenamerError::Request(format!("Failed to parse response: {}", e)))?;

        Ok(collect_text(api_response))
    }
}

fn collect_text(response: ApiResponse) -> String {
    response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

#[async_trait]
impl ExternalRenamer for AnthropicRenamer {
    async fn propose_name(&self, excerpt: &str, original_name: &str) -> Result<String, RenamerError> {
        if !self.limiter.try_acquire(PROVIDER) {
            return Err(RenamerError::RateLimited);
        }

        let proposed = self
            .send_message(build_rename_prompt(original_name, excerpt))
            .await?;

        tracing::debug!(original = original_name, proposed = %proposed, "Renamer proposal");

        if proposed.is_empty() {
            return Err(RenamerError::Unusable(proposed));
        }
        Ok(proposed)
    }
}

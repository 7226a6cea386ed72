//! Anthropic Labeling Service
//!
//! Direct call to the Anthropic Messages API with the sampled frames attached
//! as base64 JPEG image blocks.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{instruction, LabelService};
use crate::playback::EncodedFrame;
use crate::{CoreError, CoreResult};

// =============================================================================
// Anthropic Service
// =============================================================================

pub struct AnthropicLabelService {
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicLabelService {
    /// Default Anthropic API base URL
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";

    /// API version header
    pub const API_VERSION: &'static str = "2023-06-01";

    pub const MODEL: &'static str = "claude-3-5-haiku-latest";

    pub const MAX_TOKENS: u32 = 50;

    pub const TEMPERATURE: f32 = 0.0;

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

// =============================================================================
// Anthropic API Types
// =============================================================================

#[derive(Serialize)]
struct MessagesRequest {
    model: &'static str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentPart {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

fn build_request(frames: &[EncodedFrame]) -> MessagesRequest {
    let mut content = Vec::with_capacity(frames.len() + 1);
    content.push(ContentPart::Text {
        text: instruction(),
    });
    content.extend(frames.iter().map(|frame| ContentPart::Image {
        source: ImageSource {
            source_type: "base64",
            media_type: frame.mime.clone(),
            data: frame.base64(),
        },
    }));

    MessagesRequest {
        model: AnthropicLabelService::MODEL,
        max_tokens: AnthropicLabelService::MAX_TOKENS,
        temperature: AnthropicLabelService::TEMPERATURE,
        messages: vec![Message {
            role: "user",
            content,
        }],
    }
}

fn parse_response(status: reqwest::StatusCode, body: &str) -> CoreResult<String> {
    if !status.is_success() {
        let error: ApiError = serde_json::from_str(body).unwrap_or(ApiError {
            error: ApiErrorDetail {
                message: body.to_string(),
                error_type: "unknown".to_string(),
            },
        });
        return Err(CoreError::AIRequestFailed(format!(
            "Anthropic API error ({}): {} - {}",
            status, error.error.error_type, error.error.message
        )));
    }

    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::AIRequestFailed(format!("Failed to parse response: {}", e)))?;

    Ok(response
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .unwrap_or_default())
}

#[async_trait]
impl LabelService for AnthropicLabelService {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn requires_credential(&self) -> bool {
        true
    }

    async fn describe(&self, frames: &[EncodedFrame], credential: Option<&str>) -> CoreResult<String> {
        let api_key = credential.ok_or(CoreError::MissingCredential)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("Content-Type", "application/json")
            .json(&build_request(frames))
            .send()
            .await
            .map_err(|e| CoreError::AIRequestFailed(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::AIRequestFailed(format!("Failed to read response: {}", e)))?;

        parse_response(status, &body)
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Local auto-tag proxy
//!
//! `POST {frames: [dataURL, ...]}` answered by `{text}`, or `{error}` with a
//! non-2xx status. The proxy holds its own credential.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LabelService;
use crate::playback::EncodedFrame;
use crate::{CoreError, CoreResult};

pub struct ProxyLabelService {
    url: String,
    client: reqwest::Client,
}

impl ProxyLabelService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[derive(Serialize)]
struct ProxyRequest {
    frames: Vec<String>,
}

#[derive(Deserialize)]
struct ProxyResponse {
    text: Option<String>,
    error: Option<String>,
}

fn build_request(frames: &[EncodedFrame]) -> ProxyRequest {
    ProxyRequest {
        frames: frames.iter().map(EncodedFrame::to_data_url).collect(),
    }
}

fn parse_response(status: reqwest::StatusCode, body: &str) -> CoreResult<String> {
    let parsed: Option<ProxyResponse> = serde_json::from_str(body).ok();

    if !status.is_success() {
        let detail = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(CoreError::AIRequestFailed(format!(
            "Proxy error ({}): {}",
            status, detail
        )));
    }

    // A reply without text classifies as Error rather than failing over
    match parsed {
        Some(reply) => Ok(reply.text.unwrap_or_default()),
        None => Err(CoreError::AIRequestFailed(
            "Proxy response is not JSON".to_string(),
        )),
    }
}

#[async_trait]
impl LabelService for ProxyLabelService {
    fn name(&self) -> &str {
        "proxy"
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn describe(&self, frames: &[EncodedFrame], _credential: Option<&str>) -> CoreResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&build_request(frames))
            .send()
            .await
            .map_err(|e| CoreError::AIRequestFailed(format!("Proxy request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::AIRequestFailed(format!("Failed to read response: {}", e)))?;

        parse_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Label;
    use reqwest::StatusCode;

    #[test]
    fn test_request_carries_data_urls_in_order() {
        let frames = vec![
            EncodedFrame::jpeg(vec![0xff, 0xd8, 0xff]),
            EncodedFrame::jpeg(Vec::new()),
        ];
        let json = serde_json::to_value(build_request(&frames)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "frames": ["data:image/jpeg;base64,/9j/", "data:image/jpeg;base64,"]
            })
        );
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(
            parse_response(StatusCode::OK, r#"{"text":"Attack"}"#).unwrap(),
            "Attack"
        );
        assert!(parse_response(StatusCode::OK, "not json").is_err());
    }

    #[test]
    fn test_parse_reply_without_text_is_empty() {
        assert_eq!(parse_response(StatusCode::OK, r#"{}"#).unwrap(), "");
        assert_eq!(
            parse_response(StatusCode::OK, r#"{"text":null}"#).unwrap(),
            ""
        );
        assert_eq!(Label::from_response(""), Label::Error);
    }

    #[test]
    fn test_parse_error() {
        let err = parse_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Missing ANTHROPIC_API_KEY"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Missing ANTHROPIC_API_KEY"));

        let err = parse_response(StatusCode::NOT_FOUND, "Not Found").unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }
}

//! http_get: fetch a URL and return status plus (clipped) body text.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::ParameterSchema;

use super::{missing_param_error, str_arg};
use crate::executor::ToolResult;
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_BODY_CHARS: usize = 100_000;

pub struct HttpGetTool {
    client: reqwest::Client,
}

impl HttpGetTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_url(url: &str) -> Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("Only http(s) URLs are supported: {}", url))
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the status code and response body."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "url".to_string(),
            ParameterSchema::string(Some("Absolute http:// or https:// URL")),
        );
        ParameterSchema::object(None, properties, vec!["url".to_string()])
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Network
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(url) = str_arg(&args, "url") else {
            return ToolResult::err(missing_param_error("url"));
        };
        if let Err(e) = validate_url(url) {
            return ToolResult::err(e);
        }

        let request = self.client.get(url).send();
        let response = tokio::select! {
            r = request => r,
            _ = ctx.cancellation_token().cancelled() => return ToolResult::err("Request cancelled"),
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("Request failed: {}", e)),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("Failed to read body: {}", e)),
        };
        let clipped = body.chars().count() > MAX_BODY_CHARS;
        let mut body: String = body.chars().take(MAX_BODY_CHARS).collect();
        if clipped {
            body.push_str("\n[body clipped]");
        }

        let text = format!("HTTP {}\n{}", status.as_u16(), body);
        if status.is_success() {
            ToolResult::ok(text)
        } else {
            ToolResult::err(text)
        }
    }
}

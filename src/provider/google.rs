// src/provider/google.rs - Google Generative AI (Gemini) provider

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatRequest, ChatResponse, ModelProvider, Role, StopReason, TokenUsage};
use crate::infra::errors::BridgeError;

const PROVIDER_ID: &str = "google";
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 5000;

pub struct GoogleProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            api_key,
            client,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the Gemini request body from a ChatRequest.
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = Vec::new();

        for m in &request.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => continue, // system handled via system_instruction
            };

            contents.push(serde_json::json!({
                "role": role,
                "parts": [{ "text": m.content }],
            }));
        }

        let mut body = serde_json::json!({
            "contents": contents,
        });

        if let Some(ref system) = request.system {
            body["system_instruction"] = serde_json::json!({
                "parts": [{ "text": system }],
            });
        }

        let mut gen_config = serde_json::json!({});
        if let Some(max_tokens) = request.max_tokens {
            gen_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            gen_config["temperature"] = serde_json::json!(temp);
        }
        if gen_config != serde_json::json!({}) {
            body["generationConfig"] = gen_config;
        }

        body
    }
}

fn upstream(message: impl Into<String>, retriable: bool) -> BridgeError {
    BridgeError::Upstream {
        provider: PROVIDER_ID.into(),
        message: message.into(),
        retriable,
    }
}

/// Extract text, usage and finish reason from a generateContent response.
fn parse_response(resp: &serde_json::Value) -> Result<ChatResponse, BridgeError> {
    if let Some(reason) = resp["promptFeedback"]["blockReason"].as_str() {
        return Err(upstream(format!("Prompt blocked: {reason}"), false));
    }

    let parts = resp["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let content: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();

    let stop_reason = match resp["candidates"][0]["finishReason"].as_str() {
        Some("STOP") => StopReason::EndTurn,
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => StopReason::Safety,
        _ => StopReason::Unknown,
    };

    if content.trim().is_empty() {
        let message = match stop_reason {
            StopReason::Safety => "Response blocked by safety filter",
            _ => "Empty response",
        };
        return Err(upstream(message, false));
    }

    let usage = TokenUsage {
        input_tokens: resp["usageMetadata"]["promptTokenCount"]
            .as_u64()
            .unwrap_or(0) as u32,
        output_tokens: resp["usageMetadata"]["candidatesTokenCount"]
            .as_u64()
            .unwrap_or(0) as u32,
    };

    Ok(ChatResponse {
        content,
        usage,
        stop_reason,
    })
}

/// Parse a Retry-After header given in seconds.
fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000)
        .unwrap_or(DEFAULT_RATE_LIMIT_DELAY_MS)
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BridgeError> {
        let body = self.build_request_body(&request);

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, request.model, self.api_key,
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let retriable = e.is_timeout() || e.is_connect();
                let message = if e.is_timeout() {
                    "Request timed out".to_string()
                } else {
                    // reqwest errors carry the URL, which holds the key.
                    e.without_url().to_string()
                };
                upstream(message, retriable)
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BridgeError::RateLimited {
                provider: PROVIDER_ID.into(),
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&error_body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(error_body);
            return Err(upstream(
                format!("HTTP {}: {}", status, detail),
                status.is_server_error(),
            ));
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| upstream(format!("Failed to parse response: {}", e.without_url()), false))?;

        let parsed = parse_response(&resp)?;
        tracing::debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "Completion received"
        );
        Ok(parsed)
    }
}

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatCompletionRequest, ChatCompletionResponse, GenerationOptions, Message};
use super::Generator;
use crate::config::{GroqConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Client for the Groq (OpenAI-compatible) chat-completions API
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    request_config: RequestConfig,
}

impl GroqClient {
    /// Create a new Groq client
    pub fn new(config: &GroqConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        info!(
            model = %config.model,
            api_key_present = !config.api_key.is_empty(),
            "Groq client initialized"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> LlmResult<ChatCompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || error_body.contains("rate_limit") {
                return Err(LlmError::RateLimited {
                    message: error_body,
                });
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl Generator for GroqClient {
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> LlmResult<String> {
        let system_preview: String = messages
            .first()
            .map(|m| m.content.chars().take(80).collect())
            .unwrap_or_default();
        debug!(
            messages = messages.len(),
            temperature = options.temperature,
            system = %system_preview,
            "Calling Groq"
        );

        let start = Instant::now();
        let response = match self.execute_request(messages, options).await {
            Ok(response) => response,
            Err(e) if e.is_rate_limited() => {
                warn!(
                    error = %e,
                    delay_ms = self.request_config.retry_delay_ms,
                    "Rate limited, retrying once"
                );
                tokio::time::sleep(Duration::from_millis(self.request_config.retry_delay_ms))
                    .await;
                self.execute_request(messages, options).await.map_err(|e| {
                    error!(error = %e, "Groq retry failed");
                    e
                })?
            }
            Err(e) => {
                error!(
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Groq call failed"
                );
                return Err(e);
            }
        };

        let content = response.first_content();
        let usage = response.usage.as_ref();
        info!(
            latency_ms = start.elapsed().as_millis(),
            chars = content.len(),
            prompt_tokens = ?usage.and_then(|u| u.prompt_tokens),
            completion_tokens = ?usage.and_then(|u| u.completion_tokens),
            total_tokens = ?usage.and_then(|u| u.total_tokens),
            "Groq call succeeded"
        );

        Ok(content)
    }
}

//! OpenAI-compatible chat completion provider.
//!
//! Used for the fine-tuned adapter, which is typically served behind an
//! OpenAI-compatible server (vLLM, llama.cpp server, TGI). The request
//! carries the standard fields plus `top_k` and `repetition_penalty`, which
//! such servers accept as extensions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::post_json_with_retry;
use crate::error::LLMError;
use crate::llms::base_llm::{BaseLLM, GenerationParams, LLMMessage};

#[derive(Debug, Clone)]
pub struct OpenAICompatibleCompletion {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAICompatibleCompletion {
    /// `base_url` is the API root, e.g. `http://localhost:8000/v1`.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LLMError> {
        if base_url.trim().is_empty() {
            return Err(LLMError::Configuration("Adapter base URL is empty".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            max_retries: 1,
        })
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_request_body(&self, messages: &[LLMMessage], params: &GenerationParams) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
            "top_k": params.top_k,
            "repetition_penalty": params.repetition_penalty,
        })
    }

    fn parse_completions_response(&self, response: &Value) -> Result<String, LLMError> {
        let message = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LLMError::MalformedResponse("No choices in completion response".into()))?;

        if let Some(usage) = response.get("usage") {
            log::debug!(
                "Adapter token usage: prompt={}, completion={}, total={}",
                usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("total_tokens").and_then(Value::as_i64).unwrap_or(0),
            );
        }

        Ok(message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string())
    }
}

#[async_trait]
impl BaseLLM for OpenAICompatibleCompletion {
    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "openai-compatible"
    }

    async fn acall(
        &self,
        messages: &[LLMMessage],
        params: &GenerationParams,
    ) -> Result<String, LLMError> {
        log::debug!(
            "OpenAICompatibleCompletion.acall: model={}, messages={}",
            self.model,
            messages.len()
        );
        let body = self.build_request_body(messages, params);
        let endpoint = format!("{}/chat/completions", self.base_url);
        let headers: Vec<(String, String)> = self
            .api_key
            .iter()
            .map(|key| ("Authorization".to_string(), format!("Bearer {}", key)))
            .collect();
        let response = post_json_with_retry(
            &self.client,
            &endpoint,
            &headers,
            &body,
            self.max_retries,
            "OpenAI-compatible",
        )
        .await?;
        self.parse_completions_response(&response)
    }
}

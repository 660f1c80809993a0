//! Ollama chat completion provider.
//!
//! Sends a non-streaming `POST /api/chat` and reads `message.content`.
//! Sampling parameters go in the `options` object using Ollama's names
//! (`num_predict` for the token limit, `repeat_penalty`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::post_json_with_retry;
use crate::error::LLMError;
use crate::llms::base_llm::{BaseLLM, GenerationParams, LLMMessage};

#[derive(Debug, Clone)]
pub struct OllamaCompletion {
    client: Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OllamaCompletion {
    pub fn new(base_url: &str, model: &str) -> Result<Self, LLMError> {
        Self::with_timeout(base_url, model, Duration::from_secs(120))
    }

    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LLMError> {
        if model.trim().is_empty() {
            return Err(LLMError::Configuration("Ollama model name is empty".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_retries: 1,
        })
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_request_body(&self, messages: &[LLMMessage], params: &GenerationParams) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "top_p": params.top_p,
                "top_k": params.top_k,
                "repeat_penalty": params.repetition_penalty,
                "num_predict": params.max_tokens,
            }
        })
    }

    fn parse_response(&self, response: &Value) -> Result<String, LLMError> {
        let content = response
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LLMError::MalformedResponse("No message.content in Ollama response".into()))?;

        if let (Some(prompt), Some(eval)) = (
            response.get("prompt_eval_count").and_then(Value::as_i64),
            response.get("eval_count").and_then(Value::as_i64),
        ) {
            log::debug!("Ollama token usage: prompt={}, completion={}", prompt, eval);
        }

        Ok(content.to_string())
    }
}

#[async_trait]
impl BaseLLM for OllamaCompletion {
    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    async fn acall(
        &self,
        messages: &[LLMMessage],
        params: &GenerationParams,
    ) -> Result<String, LLMError> {
        log::debug!(
            "OllamaCompletion.acall: model={}, messages={}",
            self.model,
            messages.len()
        );
        let body = self.build_request_body(messages, params);
        let endpoint = format!("{}/api/chat", self.base_url);
        let response =
            post_json_with_retry(&self.client, &endpoint, &[], &body, self.max_retries, "Ollama")
                .await?;
        self.parse_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm() -> OllamaCompletion {
        OllamaCompletion::new("http://localhost:11434/", "llama2").unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let body = llm().build_request_body(
            &[LLMMessage::system("be kind"), LLMMessage::user("hello")],
            &GenerationParams::default(),
        );
        assert_eq!(body["model"], "llama2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["options"]["num_predict"], 150);
        assert_eq!(body["options"]["repeat_penalty"], 1.1);
    }

    #[test]
    fn test_parse_response() {
        let llm = llm();
        let ok = json!({"message": {"role": "assistant", "content": "Hello dear."}, "eval_count": 4, "prompt_eval_count": 20});
        assert_eq!(llm.parse_response(&ok).unwrap(), "Hello dear.");
        let bad = json!({"error": "model not found"});
        assert!(matches!(llm.parse_response(&bad), Err(LLMError::MalformedResponse(_))));
    }

    #[test]
    fn test_empty_model_rejected() {
        assert!(matches!(
            OllamaCompletion::new("http://localhost:11434", " "),
            Err(LLMError::Configuration(_))
        ));
    }
}

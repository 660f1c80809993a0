//! Completion providers.
//!
//! | Provider | Module | Endpoint |
//! |----------|--------|----------|
//! | Ollama | [`ollama`] | `POST {base}/api/chat` |
//! | OpenAI-compatible | [`openai`] | `POST {base}/chat/completions` |
//!
//! Both share [`post_json_with_retry`]: transport errors, 429, and 5xx are
//! retried with exponential backoff; other 4xx fail immediately.

pub mod ollama;
pub mod openai;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::LLMError;
use crate::utilities::text::truncate_chars;

pub use ollama::OllamaCompletion;
pub use openai::OpenAICompatibleCompletion;

/// POST a JSON body and parse a JSON response, retrying transient failures.
pub(crate) async fn post_json_with_retry(
    client: &Client,
    endpoint: &str,
    headers: &[(String, String)],
    body: &Value,
    max_retries: u32,
    provider: &str,
) -> Result<Value, LLMError> {
    let mut last_error: Option<LLMError> = None;
    let mut retry_delay = Duration::from_millis(500);

    for attempt in 0..=max_retries {
        if attempt > 0 {
            log::warn!(
                "{} retry attempt {} after {:?}",
                provider,
                attempt,
                retry_delay
            );
            tokio::time::sleep(retry_delay).await;
            retry_delay *= 2;
        }

        let mut request = client
            .post(endpoint)
            .header("Content-Type", "application/json");
        for (k, v) in headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = match request.json(body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = Some(LLMError::Http(e));
                continue;
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                last_error = Some(LLMError::Http(e));
                continue;
            }
        };

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            last_error = Some(LLMError::Api {
                status: status.as_u16(),
                body: text,
            });
            continue;
        }

        if !status.is_success() {
            return Err(LLMError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        return serde_json::from_str(&text).map_err(|e| {
            LLMError::MalformedResponse(format!(
                "{}: {} - Body: {}",
                provider,
                e,
                truncate_chars(&text, 500)
            ))
        });
    }

    Err(LLMError::RetriesExhausted(
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("{} call failed after all retries", provider)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_retries() {
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let err = post_json_with_retry(
            &client,
            "http://127.0.0.1:9/api/chat",
            &[],
            &serde_json::json!({}),
            0,
            "test",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LLMError::RetriesExhausted(_)));
    }
}

//! OpenAI-compatible chat completion invoker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{Invocation, InvokeError, Invoker};
use crate::config::ProviderConfig;
use crate::stages::AgentIdentity;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

/// Sends each stage to `{base_url}/chat/completions`.
///
/// The identity becomes the system message and the rendered prompt the user
/// message. The identity's model override wins over the configured model.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleInvoker {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiCompatibleInvoker {
    /// Creates an invoker with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Transport`] if the client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, InvokeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("stagechain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InvokeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates an invoker sharing an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request<'a>(&'a self, identity: &'a AgentIdentity, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: self.config.request_model(identity.model.as_deref()),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: identity.system_prompt().into(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.into(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl Invoker for OpenAiCompatibleInvoker {
    async fn invoke(&self, identity: &AgentIdentity, prompt: &str) -> Result<Invocation, InvokeError> {
        let body = self.build_request(identity, prompt);
        let start = Instant::now();

        let mut request = self.client.post(self.config.completions_url()).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e, self.config.timeout()))?;

        let status = response.status();
        if !status.is_success() {
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(status = status.as_u16(), error = %e, "Failed to read provider error body");
                    String::new()
                }
            };
            return Err(InvokeError::Provider {
                status: status.as_u16(),
                message: provider_message(status, &text),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InvokeError::InvalidResponse(e.to_string()))?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            agent = %identity.name,
            model = %body.model,
            latency_ms,
            "Chat completion returned"
        );

        Ok(into_invocation(parsed, body.model, latency_ms))
    }
}

fn into_invocation(parsed: ChatResponse, requested_model: &str, latency_ms: f64) -> Invocation {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    let usage = parsed.usage.unwrap_or(Usage {
        prompt_tokens: None,
        completion_tokens: None,
    });
    Invocation {
        text,
        model: Some(parsed.model.unwrap_or_else(|| requested_model.to_string())),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        latency_ms: Some(latency_ms),
    }
}

fn map_transport_error(error: &reqwest::Error, timeout: Duration) -> InvokeError {
    if error.is_timeout() {
        InvokeError::Timeout(timeout)
    } else {
        InvokeError::Transport(error.to_string())
    }
}

/// Pulls `error.message` out of an OpenAI-style error body.
fn provider_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        status.canonical_reason().unwrap_or("unknown provider error").to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn invoker() -> OpenAiCompatibleInvoker {
        let mut config = ProviderConfig::new().with_model("openai/gpt-4o");
        config.temperature = Some(0.5);
        OpenAiCompatibleInvoker::new(config).unwrap()
    }

    #[test]
    fn test_request_body() {
        let invoker = invoker();
        let identity = AgentIdentity::new("Tech Lead").with_role("Technical Summarizer");
        let body = serde_json::to_value(invoker.build_request(&identity, "Summarize: x")).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are Tech Lead.\nRole: Technical Summarizer"},
                    {"role": "user", "content": "Summarize: x"}
                ],
                "temperature": 0.5
            })
        );
    }

    #[test]
    fn test_identity_model_override() {
        let invoker = invoker();
        let identity = AgentIdentity::new("a").with_model("openai/gpt-5-mini");
        assert_eq!(invoker.build_request(&identity, "p").model, "gpt-5-mini");
    }

    #[test]
    fn test_parse_response() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "Shipped dark mode."}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }))
        .unwrap();

        let invocation = into_invocation(parsed, "gpt-4o", 5.0);
        assert_eq!(invocation.text, "Shipped dark mode.");
        assert_eq!(invocation.model.as_deref(), Some("gpt-4o-2024-08-06"));
        assert_eq!(invocation.total_tokens(), 16);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let parsed: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let invocation = into_invocation(parsed, "gpt-4o", 1.0);
        assert!(invocation.text.is_empty());
        assert_eq!(invocation.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_provider_message() {
        assert_eq!(
            provider_message(
                StatusCode::UNAUTHORIZED,
                r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#
            ),
            "Invalid API key"
        );
        assert_eq!(provider_message(StatusCode::BAD_GATEWAY, " upstream down \n"), "upstream down");
    }

    #[test]
    fn test_provider_message_falls_back_to_status_reason() {
        assert_eq!(provider_message(StatusCode::TOO_MANY_REQUESTS, ""), "Too Many Requests");
        assert_eq!(provider_message(StatusCode::SERVICE_UNAVAILABLE, " \n"), "Service Unavailable");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let config = ProviderConfig::new().with_base_url("http://127.0.0.1:9");
        let invoker = OpenAiCompatibleInvoker::new(config).unwrap();
        let err = invoker
            .invoke(&AgentIdentity::new("a"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Transport(_) | InvokeError::Timeout(_)));
    }
}

//! Path: crates/sim-liveio/src/llm.rs
//! The language-model half of LiveIO (§4.6): mock-table lookup by prompt-key
//! regex, else a live call to whichever provider the request (or the server's
//! default) names. API keys come from the environment — never from request
//! parameters — and a missing key or unknown provider is encoded into the
//! response rather than panicking.

use std::sync::Arc;

use serde_json::json;
use sim_engine::{LlmHandler, LlmRequest, LlmResponse};

use crate::bridge::Bridge;
use crate::mock::MockTable;

/// The server-wide default provider string, `--llm-provider` overrides this.
pub const DEFAULT_PROVIDER: &str = "openai:gpt-4o-mini";

#[derive(Clone, Debug)]
pub struct LiveLlmConfig {
    pub default_provider: String,
}

impl Default for LiveLlmConfig {
    fn default() -> Self {
        Self { default_provider: DEFAULT_PROVIDER.to_string() }
    }
}

pub struct LiveLlmHandler {
    mocks: Arc<MockTable>,
    bridge: Bridge,
    config: LiveLlmConfig,
}

impl LiveLlmHandler {
    pub fn new(mocks: Arc<MockTable>, bridge: Bridge, config: LiveLlmConfig) -> Self {
        Self { mocks, bridge, config }
    }
}

impl LlmHandler for LiveLlmHandler {
    fn handle(&self, request: LlmRequest) -> LlmResponse {
        if let Some(mocked) = self.mocks.match_llm(&request.prompt) {
            return finish(mocked, request.response_format_json);
        }
        self.bridge.llm_request(request, self.config.clone())
    }
}

/// Parses a provider config string such as `"openai:gpt-4o-mini"` into
/// `(provider, model)`. A bare model name with no provider prefix is treated
/// as an OpenAI model, matching the original's lenient parsing.
fn split_provider(spec: &str) -> (&str, &str) {
    match spec.split_once(':') {
        Some((provider, model)) => (provider, model),
        None => ("openai", spec),
    }
}

pub(crate) async fn run_live(client: &reqwest::Client, request: LlmRequest, config: LiveLlmConfig) -> LlmResponse {
    let provider_spec = request.provider.clone().unwrap_or(config.default_provider.clone());
    let (provider, model) = split_provider(&provider_spec);

    let text_result = match provider {
        "openai" => call_openai(client, model, &request.prompt).await,
        "anthropic" => call_anthropic(client, model, &request.prompt).await,
        other => Err(format!("unknown llm provider {other:?}")),
    };

    match text_result {
        Ok(text) => finish(text, request.response_format_json),
        Err(message) => finish(message, request.response_format_json),
    }
}

fn finish(text: String, response_format_json: bool) -> LlmResponse {
    let structured = if response_format_json { serde_json::from_str(&text).ok() } else { None };
    LlmResponse { text, structured }
}

async fn call_openai(client: &reqwest::Client, model: &str, prompt: &str) -> Result<String, String> {
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| "missing API key for provider \"openai\"".to_string())?;
    let body = json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
    });
    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("http request failed: {e}"))?;
    let payload: serde_json::Value = response.json().await.map_err(|e| format!("http request failed: {e}"))?;
    payload
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| "http request failed: unexpected openai response shape".to_string())
}

async fn call_anthropic(client: &reqwest::Client, model: &str, prompt: &str) -> Result<String, String> {
    let api_key =
        std::env::var("ANTHROPIC_API_KEY").map_err(|_| "missing API key for provider \"anthropic\"".to_string())?;
    let body = json!({
        "model": model,
        "max_tokens": 1024,
        "messages": [{"role": "user", "content": prompt}],
    });
    let response = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("http request failed: {e}"))?;
    let payload: serde_json::Value = response.json().await.map_err(|e| format!("http request failed: {e}"))?;
    payload
        .pointer("/content/0/text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| "http request failed: unexpected anthropic response shape".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_provider_defaults_bare_model_to_openai() {
        assert_eq!(split_provider("openai:gpt-4o-mini"), ("openai", "gpt-4o-mini"));
        assert_eq!(split_provider("anthropic:claude-3-haiku"), ("anthropic", "claude-3-haiku"));
        assert_eq!(split_provider("gpt-4o-mini"), ("openai", "gpt-4o-mini"));
    }

    #[test]
    fn finish_parses_structured_output_only_when_requested() {
        let plain = finish("hello".to_string(), false);
        assert!(plain.structured.is_none());

        let structured = finish("{\"a\":1}".to_string(), true);
        assert_eq!(structured.structured, Some(json!({"a": 1})));

        let fallback = finish("not json".to_string(), true);
        assert!(fallback.structured.is_none());
        assert_eq!(fallback.text, "not json");
    }
}

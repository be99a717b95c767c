//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Covers OpenAI itself and local servers speaking the same protocol
//! (LM Studio, Ollama). All OpenAI wire types are private to this module.
//! [`OpenAiCompatibleProvider::stream`] requests `stream: true` and decodes
//! the server-sent event body incrementally.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::sse::{SseDecoder, SseEvent};
use crate::llm::{ChatMessage, ProviderError};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    /// Whole-request limit for `complete`; idle limit between stream chunks.
    timeout: Duration,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(timeout_seconds);
        // No client-wide total timeout: it would also cut off long streams.
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, timeout, api_key })
    }

    /// Lightweight reachability probe.
    ///
    /// Any HTTP response (including 4xx) means the server is reachable.
    /// Only a transport-level failure is treated as unreachable.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build ping client: {e}")))?;
        let mut req = client.head(&self.api_base_url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))
    }

    /// One non-streaming round trip over the full `messages` history.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let response = self.send(messages, false).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))
    }

    /// Streaming round trip. `on_delta` sees each content fragment in
    /// arrival order; the concatenation is returned once `[DONE]` arrives
    /// or the body ends.
    ///
    /// The configured timeout bounds the wait for the response head and the
    /// gap between body chunks, not the length of the whole reply.
    pub async fn stream<F>(&self, messages: &[ChatMessage], mut on_delta: F) -> Result<String, ProviderError>
    where
        F: FnMut(&str),
    {
        let response = tokio::time::timeout(self.timeout, self.send(messages, true))
            .await
            .map_err(|_| self.stalled("waiting for response"))??;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut text = String::new();
        let mut chunks = 0usize;
        let mut done = false;

        'body: loop {
            let next = tokio::time::timeout(self.timeout, body.next())
                .await
                .map_err(|_| self.stalled("mid-stream"))?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                error!(error = %e, "LLM stream interrupted");
                ProviderError::Request(format!("stream interrupted: {e}"))
            })?;
            for event in decoder.feed(&chunk) {
                match event {
                    SseEvent::Done => {
                        done = true;
                        break 'body;
                    }
                    SseEvent::Data(data) => {
                        chunks += 1;
                        if let Some(delta) = parse_delta(&data)? {
                            on_delta(&delta);
                            text.push_str(&delta);
                        }
                    }
                }
            }
        }
        if !done {
            if let Some(SseEvent::Data(data)) = decoder.finish() {
                if let Some(delta) = parse_delta(&data)? {
                    on_delta(&delta);
                    text.push_str(&delta);
                }
            }
        }

        debug!(chunks, reply_len = text.len(), "LLM stream finished");
        Ok(text)
    }

    fn stalled(&self, phase: &str) -> ProviderError {
        error!(phase, timeout_secs = self.timeout.as_secs(), "LLM stream stalled");
        ProviderError::Request(format!("no data {phase} for {}s", self.timeout.as_secs()))
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, ProviderError> {
        // Some models (gpt-5 family) do not accept a temperature parameter.
        let temperature = if self.model.starts_with("gpt-5") { None } else { Some(self.temperature) };

        let payload = ChatCompletionRequest { model: &self.model, messages, temperature, stream };

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            messages = messages.len(),
            stream,
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if !stream {
            req = req.timeout(self.timeout);
        }
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        check_status(response).await
    }
}

/// Extract `choices[0].delta.content` from one stream chunk.
/// Role-only and finish chunks yield `None`.
fn parse_delta(data: &str) -> Result<Option<String>, ProviderError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| ProviderError::Stream(format!("{e}: {data}")))?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Request(err.message));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
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
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

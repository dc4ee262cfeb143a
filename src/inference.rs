use anyhow::{anyhow, Context};
use chrono::Utc;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

pub const TIMEOUT_SENTINEL: &str = "inference request timed out";

/// Timing record for one inference call. `latency_ms` comes from a monotonic
/// clock; the wall-clock stamps exist for persistence and log correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub start_ms: i64,
    pub end_ms: i64,
    pub latency_ms: f64,
    /// Time to first non-empty content delta. None when not streaming.
    pub ttft_ms: Option<f64>,
    pub tokens: u64,
    /// Deltas between consecutive content deltas. Empty when not streaming
    /// or fewer than two tokens arrived.
    pub inter_token_delays_ms: Vec<f64>,
    pub error: Option<String>,
    pub timeout: bool,
}

impl IterationMetrics {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && !self.timeout
    }
}

#[derive(Debug, Clone)]
pub struct InferenceRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
    pub streaming: bool,
}

/// Thin client for one OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: String,
}

struct StreamObservation {
    ttft_ms: Option<f64>,
    tokens: u64,
    inter_token_delays_ms: Vec<f64>,
}

impl InferenceClient {
    pub fn new(endpoint: &str) -> Self {
        InferenceClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one chat completion and measure it. Never returns Err: failures
    /// and timeouts are captured in the metrics so the scenario runner can
    /// account for them per iteration.
    pub async fn infer(&self, request: InferenceRequest<'_>) -> IterationMetrics {
        let start_ms = Utc::now().timestamp_millis();
        let started = Instant::now();

        let outcome = tokio::time::timeout(request.timeout, async {
            if request.streaming {
                self.execute_streaming(&request, started).await
            } else {
                self.execute_blocking(&request).await
            }
        })
        .await;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let end_ms = Utc::now().timestamp_millis();

        match outcome {
            Ok(Ok(observation)) => IterationMetrics {
                start_ms,
                end_ms,
                latency_ms,
                ttft_ms: observation.ttft_ms,
                tokens: observation.tokens,
                inter_token_delays_ms: observation.inter_token_delays_ms,
                error: None,
                timeout: false,
            },
            Ok(Err(err)) => IterationMetrics {
                start_ms,
                end_ms,
                latency_ms,
                ttft_ms: None,
                tokens: 0,
                inter_token_delays_ms: vec![],
                error: Some(format!("{:#}", err)),
                timeout: false,
            },
            Err(_elapsed) => IterationMetrics {
                start_ms,
                end_ms,
                latency_ms,
                ttft_ms: None,
                tokens: 0,
                inter_token_delays_ms: vec![],
                error: Some(TIMEOUT_SENTINEL.to_string()),
                timeout: true,
            },
        }
    }

    async fn send(&self, request: &InferenceRequest<'_>, stream: bool) -> anyhow::Result<reqwest::Response> {
        let body = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": stream,
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&body)
            .send()
            .await
            .context("Error sending chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("backend returned {}: {}", status, detail));
        }

        Ok(response)
    }

    /// Consume the server-sent event stream, stamping TTFT on the first
    /// non-empty content delta and an inter-token delay on each one after.
    async fn execute_streaming(
        &self,
        request: &InferenceRequest<'_>,
        started: Instant,
    ) -> anyhow::Result<StreamObservation> {
        let response = self.send(request, true).await?;
        let mut events = response.bytes_stream().eventsource();

        let mut ttft_ms = None;
        let mut tokens = 0u64;
        let mut inter_token_delays_ms = vec![];
        let mut previous_token_at: Option<Instant> = None;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| anyhow!("error reading completion stream: {}", e))?;
            if event.data.trim() == "[DONE]" {
                break;
            }

            let chunk = match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!("skipping unparsable stream event: {}", err);
                    continue;
                }
            };

            let content = chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_deref())
                .unwrap_or_default();
            if content.is_empty() {
                continue;
            }

            // Stamped here, inside the read path, not on header receipt.
            let now = Instant::now();
            match previous_token_at {
                None => ttft_ms = Some((now - started).as_secs_f64() * 1000.0),
                Some(previous) => {
                    inter_token_delays_ms.push((now - previous).as_secs_f64() * 1000.0)
                }
            }
            previous_token_at = Some(now);
            tokens += 1;
        }

        Ok(StreamObservation {
            ttft_ms,
            tokens,
            inter_token_delays_ms,
        })
    }

    /// Single-response completion; token count comes from the backend's
    /// reported usage.
    async fn execute_blocking(
        &self,
        request: &InferenceRequest<'_>,
    ) -> anyhow::Result<StreamObservation> {
        let response = self.send(request, false).await?;
        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .context("Error parsing chat completion response")?;

        let tokens = completion
            .usage
            .and_then(|usage| usage.completion_tokens)
            .unwrap_or(0);

        Ok(StreamObservation {
            ttft_ms: None,
            tokens,
            inter_token_delays_ms: vec![],
        })
    }
}

// //////////////////////////////////////
// Wire format

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_with_content_parses() -> anyhow::Result<()> {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"cc-1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#,
        )?;
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
        Ok(())
    }

    #[test]
    fn role_only_chunk_has_no_content() -> anyhow::Result<()> {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
        )?;
        assert_eq!(chunk.choices[0].delta.content, None);
        Ok(())
    }

    #[test]
    fn usage_is_optional_in_responses() -> anyhow::Result<()> {
        let completion: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#)?;
        assert!(completion.usage.is_none());

        let completion: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":42}}"#,
        )?;
        assert_eq!(completion.usage.unwrap().completion_tokens, Some(42));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error_not_a_timeout() {
        let client = InferenceClient::new("http://127.0.0.1:9");
        let metrics = client
            .infer(InferenceRequest {
                model: "m",
                prompt: "Hi",
                max_tokens: 10,
                temperature: 0.0,
                timeout: Duration::from_secs(5),
                streaming: false,
            })
            .await;

        assert!(!metrics.timeout);
        assert!(metrics.error.is_some());
        assert_eq!(metrics.tokens, 0);
        assert!(metrics.end_ms >= metrics.start_ms);
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use parking_lot::Mutex;
use reqwest::Client;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::{
    error::ServiceError,
    provider::types::{GenerationResult, InferenceRequest, InferenceResponse, StreamChunk},
    settings::ProviderSettings,
};

/// Items produced by a streaming generation call: zero or more fragments,
/// then exactly one `Completed` carrying the aggregate.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Fragment(String),
    Completed(GenerationResult),
}

pub type FragmentStream = BoxStream<'static, Result<StreamItem, ServiceError>>;

/// A hosted text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        settings: &ProviderSettings,
    ) -> Result<GenerationResult, ServiceError>;

    async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
        settings: &ProviderSettings,
    ) -> Result<FragmentStream, ServiceError>;
}

/// DeepInfra inference API client. One reqwest client is shared across all
/// models; per-model endpoint URLs are built once and cached.
pub struct DeepInfraClient {
    http: Client,
    api_key: String,
    base_url: String,
    endpoints: Mutex<HashMap<String, String>>,
}

impl DeepInfraClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.deepinfra.com".to_string(),
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint_for(&self, model: &str) -> String {
        let mut endpoints = self.endpoints.lock();
        endpoints
            .entry(model.to_string())
            .or_insert_with(|| {
                format!(
                    "{}/v1/inference/{model}",
                    self.base_url.trim_end_matches('/')
                )
            })
            .clone()
    }

    async fn post_inference(
        &self,
        prompt: &str,
        model: &str,
        settings: &ProviderSettings,
        stream: bool,
    ) -> Result<reqwest::Response, ServiceError> {
        let url = self.endpoint_for(model);
        let request = InferenceRequest {
            input: prompt,
            stream,
            settings,
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%model, %status, "inference request rejected");
            return Err(ServiceError::Provider(format!(
                "provider returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for DeepInfraClient {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        settings: &ProviderSettings,
    ) -> Result<GenerationResult, ServiceError> {
        let response = self.post_inference(prompt, model, settings, false).await?;
        let body: InferenceResponse = response.json().await?;
        let text = body
            .results
            .into_iter()
            .next()
            .map(|result| result.generated_text)
            .ok_or_else(|| ServiceError::Provider("provider returned no results".to_string()))?;

        Ok(GenerationResult {
            text,
            tokens_consumed: body.inference_status.tokens_generated,
            tokens_prompt: body.inference_status.tokens_input,
            finish_reason: None,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
        settings: &ProviderSettings,
    ) -> Result<FragmentStream, ServiceError> {
        let response = self.post_inference(prompt, model, settings, true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamItem, ServiceError>>(32);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut acc = StreamAccumulator::default();

            'read: while let Some(next) = body.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let _ = tx
                            .send(Err(ServiceError::Provider(err.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let chunk = match decode_stream_line(&line) {
                        DecodedLine::Chunk(chunk) => chunk,
                        DecodedLine::Skip => continue,
                        DecodedLine::Done => break 'read,
                    };
                    if let Some(fragment) = acc.absorb(chunk) {
                        if tx.send(Ok(StreamItem::Fragment(fragment))).await.is_err() {
                            // Receiver dropped, stop reading from the provider.
                            return;
                        }
                    }
                }
            }

            let _ = tx.send(Ok(StreamItem::Completed(acc.into_result()))).await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn data_payload(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim_start)
}

/// One raw line of the provider's SSE body, classified. Lines that cannot
/// be decoded are logged and dropped; the stream keeps going.
enum DecodedLine {
    Chunk(StreamChunk),
    Done,
    Skip,
}

fn decode_stream_line(line: &[u8]) -> DecodedLine {
    let Ok(line) = std::str::from_utf8(line) else {
        debug!("skipping non-utf8 stream line");
        return DecodedLine::Skip;
    };
    let Some(payload) = data_payload(line) else {
        return DecodedLine::Skip;
    };
    if payload == "[DONE]" {
        return DecodedLine::Done;
    }
    match serde_json::from_str(payload) {
        Ok(chunk) => DecodedLine::Chunk(chunk),
        Err(_) => {
            debug!("skipping undecodable stream line");
            DecodedLine::Skip
        }
    }
}

/// Folds streamed chunks into the final result while handing fragments on.
#[derive(Default)]
struct StreamAccumulator {
    aggregated: String,
    final_text: Option<String>,
    tokens_generated: u64,
    input_length: u64,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    fn absorb(&mut self, chunk: StreamChunk) -> Option<String> {
        if let Some(details) = chunk.details {
            self.tokens_generated = details.generated_tokens;
            if details.input_length > 0 {
                self.input_length = details.input_length;
            }
            if details.finish_reason.is_some() {
                self.finish_reason = details.finish_reason;
            }
        }
        if let Some(text) = chunk.generated_text {
            self.final_text = Some(text);
        }
        let fragment = chunk
            .token
            .map(|token| token.text)
            .filter(|text| !text.is_empty());
        if let Some(fragment) = &fragment {
            self.aggregated.push_str(fragment);
        }
        fragment
    }

    fn into_result(self) -> GenerationResult {
        GenerationResult {
            text: self.final_text.unwrap_or(self.aggregated),
            tokens_consumed: self.tokens_generated,
            tokens_prompt: self.input_length,
            finish_reason: self.finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_data_payloads_only() {
        assert_eq!(data_payload("data: {\"token\":{}}"), Some("{\"token\":{}}"));
        assert_eq!(data_payload("data:[DONE]"), Some("[DONE]"));
        assert_eq!(data_payload("  data: [DONE]  "), Some("[DONE]"));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: ping"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn undecodable_stream_lines_are_skipped() {
        assert!(matches!(
            decode_stream_line(b"data: \xff\xfe"),
            DecodedLine::Skip
        ));
        assert!(matches!(
            decode_stream_line(b"data: not json"),
            DecodedLine::Skip
        ));
        assert!(matches!(
            decode_stream_line(b": keep-alive"),
            DecodedLine::Skip
        ));
    }

    #[test]
    fn stream_lines_decode_to_chunks_until_done() {
        let DecodedLine::Chunk(chunk) =
            decode_stream_line(br#"data: {"token": {"text": "The "}}"#)
        else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.token.unwrap().text, "The ");
        assert!(matches!(decode_stream_line(b"data: [DONE]"), DecodedLine::Done));
    }

    #[test]
    fn accumulator_prefers_the_provider_final_text() {
        let mut acc = StreamAccumulator::default();
        for line in [
            r#"{"token": {"text": "The "}}"#,
            r#"{"token": {"text": "end."}, "generated_text": "The end.", "details": {"finish_reason": "stop", "generated_tokens": 2, "input_length": 9}}"#,
        ] {
            let chunk: StreamChunk = serde_json::from_str(line).unwrap();
            acc.absorb(chunk);
        }
        let result = acc.into_result();
        assert_eq!(result.text, "The end.");
        assert_eq!(result.tokens_consumed, 2);
        assert_eq!(result.tokens_prompt, 9);
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn accumulator_falls_back_to_aggregated_fragments() {
        let mut acc = StreamAccumulator::default();
        for text in ["The ", "tide ", "turned."] {
            let chunk: StreamChunk =
                serde_json::from_str(&format!(r#"{{"token": {{"text": "{text}"}}}}"#)).unwrap();
            assert_eq!(acc.absorb(chunk).as_deref(), Some(text));
        }
        let result = acc.into_result();
        assert_eq!(result.text, "The tide turned.");
        assert_eq!(result.tokens_consumed, 0);
        assert!(result.finish_reason.is_none());
    }

    #[test]
    fn empty_token_text_is_not_forwarded() {
        let mut acc = StreamAccumulator::default();
        let chunk: StreamChunk = serde_json::from_str(r#"{"token": {"text": ""}}"#).unwrap();
        assert_eq!(acc.absorb(chunk), None);
    }

    #[test]
    fn endpoints_are_cached_per_model() {
        let client = DeepInfraClient::new("key").with_base_url("http://localhost:9/");
        let first = client.endpoint_for("org/model-a");
        assert_eq!(first, "http://localhost:9/v1/inference/org/model-a");
        assert_eq!(client.endpoint_for("org/model-a"), first);
        assert_eq!(client.endpoints.lock().len(), 1);

        client.endpoint_for("org/model-b");
        assert_eq!(client.endpoints.lock().len(), 2);
    }
}

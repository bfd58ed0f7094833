use serde::{Deserialize, Serialize};

use crate::settings::ProviderSettings;

/// Final outcome of one generation call, batch or streamed.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub text: String,
    pub tokens_consumed: u64,
    pub tokens_prompt: u64,
    pub finish_reason: Option<String>,
}

/// Body of `POST {base}/v1/inference/{model}`. Sampling settings sit at the
/// top level next to the input.
#[derive(Debug, Serialize)]
pub(crate) struct InferenceRequest<'a> {
    pub input: &'a str,
    pub stream: bool,
    #[serde(flatten)]
    pub settings: &'a ProviderSettings,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InferenceResponse {
    #[serde(default)]
    pub inference_status: InferenceStatus,
    pub results: Vec<GeneratedText>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InferenceStatus {
    #[serde(default)]
    pub tokens_generated: u64,
    #[serde(default)]
    pub tokens_input: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeneratedText {
    pub generated_text: String,
}

/// One decoded line of the streaming response. Ordinary lines carry a token;
/// the final line additionally carries the full text and generation details.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub token: Option<ChunkToken>,
    #[serde(default)]
    pub generated_text: Option<String>,
    #[serde(default)]
    pub details: Option<ChunkDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkToken {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkDetails {
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub generated_tokens: u64,
    #[serde(default)]
    pub input_length: u64,
}

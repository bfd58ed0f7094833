use serde::{Deserialize, Serialize};

use crate::{
    catalog,
    error::{FieldError, ServiceError},
    settings::SettingsPatch,
};

/// One prior exchange in a chat-style continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Optional knobs that only shape the prompt text, never the sampling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NarrativePreferences {
    pub genre: Option<String>,
    pub writing_style: Option<String>,
    pub point_of_view: Option<String>,
}

/// Body of `POST /v1/generate` and `POST /v2/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub context: String,
    pub model: String,
    #[serde(default)]
    pub settings: SettingsPatch,
    #[serde(default)]
    pub narrative: NarrativePreferences,
}

/// Body of `POST /v1/chat`. The full history travels with every request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    pub model: String,
    #[serde(default)]
    pub settings: SettingsPatch,
}

/// Body of `POST /v2/chat`. The story lives server-side under `story_id`;
/// the message is an optional steering instruction for the next chapter.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    pub story_id: String,
    pub model: String,
    #[serde(default)]
    pub settings: SettingsPatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub content: String,
    pub prompt_used: String,
    pub tokens_consumed: u64,
    pub tokens_prompt: u64,
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut errors = Vec::new();
        if self.context.trim().is_empty() {
            errors.push(FieldError::new("context", "Context is required."));
        }
        check_model(&self.model, &mut errors);
        check_settings(&self.settings, &mut errors);
        check_narrative(&self.narrative, &mut errors);
        finish(errors)
    }
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut errors = Vec::new();
        if self.message.trim().is_empty() {
            errors.push(FieldError::new("message", "Message is required."));
        }
        if self.history.is_empty() {
            errors.push(FieldError::new("history", "Chat history is required."));
        }
        check_model(&self.model, &mut errors);
        check_settings(&self.settings, &mut errors);
        finish(errors)
    }
}

impl StreamChatRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut errors = Vec::new();
        if self.story_id.trim().is_empty() {
            errors.push(FieldError::new("story_id", "Story id is required."));
        }
        check_model(&self.model, &mut errors);
        check_settings(&self.settings, &mut errors);
        finish(errors)
    }

    /// A blank instruction means "just continue the story".
    pub fn instruction(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

fn finish(errors: Vec<FieldError>) -> Result<(), ServiceError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(errors))
    }
}

fn check_model(model: &str, errors: &mut Vec<FieldError>) {
    if model.trim().is_empty() {
        errors.push(FieldError::new("model", "Model is required."));
    } else if !catalog::is_known_model(model) {
        errors.push(FieldError::new("model", "Model is not recognized."));
    }
}

fn check_settings(patch: &SettingsPatch, errors: &mut Vec<FieldError>) {
    check_range("temperature", patch.temperature, errors);
    check_range("top_p", patch.top_p, errors);
    check_range("top_k", patch.top_k.map(f64::from), errors);
    check_range("presence_penalty", patch.presence_penalty, errors);
    check_range("frequency_penalty", patch.frequency_penalty, errors);
    check_range("repetition_penalty", patch.repetition_penalty, errors);
    check_range("max_tokens", patch.max_tokens.map(f64::from), errors);
}

fn check_range(key: &'static str, value: Option<f64>, errors: &mut Vec<FieldError>) {
    let Some(value) = value else { return };
    let Some(range) = catalog::setting_range(key) else {
        return;
    };
    if !range.contains(value) {
        errors.push(FieldError::new(
            key,
            format!(
                "{} must be between {} and {}.",
                range.label, range.min, range.max
            ),
        ));
    }
}

fn check_narrative(narrative: &NarrativePreferences, errors: &mut Vec<FieldError>) {
    check_choice("genre", narrative.genre.as_deref(), &catalog::GENRES, errors);
    check_choice(
        "writing_style",
        narrative.writing_style.as_deref(),
        &catalog::WRITING_STYLES,
        errors,
    );
    check_choice(
        "point_of_view",
        narrative.point_of_view.as_deref(),
        &catalog::POINTS_OF_VIEW,
        errors,
    );
}

fn check_choice(
    key: &'static str,
    value: Option<&str>,
    allowed: &[&str],
    errors: &mut Vec<FieldError>,
) {
    let Some(value) = value else { return };
    if !allowed.contains(&value) {
        let label = match key {
            "genre" => "genre",
            "writing_style" => "writing style",
            _ => "point of view",
        };
        errors.push(FieldError::new(key, format!("Invalid {label}.")));
    }
}

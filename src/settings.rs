use serde::{Deserialize, Serialize};

/// The subset of generation settings a client chose to override. Anything
/// left `None` falls back to the service default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Fully resolved generation settings, every key present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub repetition_penalty: f64,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            top_k: 0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            repetition_penalty: 1.0,
            max_tokens: 2000,
        }
    }
}

impl GenerationSettings {
    pub fn merged(patch: &SettingsPatch) -> Self {
        let defaults = Self::default();
        Self {
            temperature: patch.temperature.unwrap_or(defaults.temperature),
            top_p: patch.top_p.unwrap_or(defaults.top_p),
            top_k: patch.top_k.unwrap_or(defaults.top_k),
            presence_penalty: patch.presence_penalty.unwrap_or(defaults.presence_penalty),
            frequency_penalty: patch
                .frequency_penalty
                .unwrap_or(defaults.frequency_penalty),
            repetition_penalty: patch
                .repetition_penalty
                .unwrap_or(defaults.repetition_penalty),
            max_tokens: patch.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }

    /// Provider-facing form. DeepInfra names the token cap `max_new_tokens`;
    /// every other key keeps its name.
    pub fn to_provider(&self) -> ProviderSettings {
        ProviderSettings {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            repetition_penalty: self.repetition_penalty,
            max_new_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub repetition_penalty: f64,
    pub max_new_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_yields_defaults() {
        let settings = GenerationSettings::merged(&SettingsPatch::default());
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.top_p, 1.0);
        assert_eq!(settings.top_k, 0);
        assert_eq!(settings.presence_penalty, 0.0);
        assert_eq!(settings.frequency_penalty, 0.0);
        assert_eq!(settings.repetition_penalty, 1.0);
        assert_eq!(settings.max_tokens, 2000);
    }

    #[test]
    fn patch_overrides_only_named_keys() {
        let patch = SettingsPatch {
            temperature: Some(1.2),
            max_tokens: Some(512),
            ..SettingsPatch::default()
        };
        let settings = GenerationSettings::merged(&patch);
        assert_eq!(settings.temperature, 1.2);
        assert_eq!(settings.max_tokens, 512);
        assert_eq!(settings.top_p, 1.0);
        assert_eq!(settings.repetition_penalty, 1.0);
    }

    #[test]
    fn provider_form_renames_the_token_cap() {
        let provider = GenerationSettings::default().to_provider();
        let value = serde_json::to_value(&provider).unwrap();
        assert_eq!(value["max_new_tokens"], 2000);
        assert!(value.get("max_tokens").is_none());
        assert_eq!(value["temperature"], 0.7);
    }

    #[test]
    fn unknown_patch_keys_are_ignored() {
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"temperature": 0.3, "n": 4}"#).unwrap();
        let settings = GenerationSettings::merged(&patch);
        assert_eq!(settings.temperature, 0.3);
        assert_eq!(settings.max_tokens, 2000);
    }
}

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Value, json};

/// A text model hosted by the inference provider.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

/// Accepted bounds for one generation setting.
#[derive(Debug, Clone, Copy)]
pub struct SettingRange {
    pub key: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub integer: bool,
}

impl SettingRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub static MODELS: Lazy<Vec<ModelInfo>> = Lazy::new(|| {
    vec![
        ModelInfo {
            id: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            name: "Llama 3.3 70B Instruct Turbo",
            description: Some("Balanced default for long-form fiction."),
        },
        ModelInfo {
            id: "meta-llama/Meta-Llama-3.1-8B-Instruct",
            name: "Llama 3.1 8B Instruct",
            description: Some("Fast and inexpensive, shorter chapters."),
        },
        ModelInfo {
            id: "mistralai/Mixtral-8x7B-Instruct-v0.1",
            name: "Mixtral 8x7B Instruct",
            description: None,
        },
        ModelInfo {
            id: "Qwen/Qwen2.5-72B-Instruct",
            name: "Qwen2.5 72B Instruct",
            description: None,
        },
        ModelInfo {
            id: "deepseek-ai/DeepSeek-V3",
            name: "DeepSeek V3",
            description: Some("Strongest prose quality, slowest to stream."),
        },
    ]
});

pub static SETTING_RANGES: Lazy<Vec<SettingRange>> = Lazy::new(|| {
    vec![
        SettingRange {
            key: "temperature",
            label: "Temperature",
            min: 0.0,
            max: 2.0,
            default: 0.7,
            integer: false,
        },
        SettingRange {
            key: "top_p",
            label: "Top-p",
            min: 0.0,
            max: 1.0,
            default: 1.0,
            integer: false,
        },
        SettingRange {
            key: "top_k",
            label: "Top-k",
            min: 0.0,
            max: 1000.0,
            default: 0.0,
            integer: true,
        },
        SettingRange {
            key: "presence_penalty",
            label: "Presence penalty",
            min: -2.0,
            max: 2.0,
            default: 0.0,
            integer: false,
        },
        SettingRange {
            key: "frequency_penalty",
            label: "Frequency penalty",
            min: -2.0,
            max: 2.0,
            default: 0.0,
            integer: false,
        },
        SettingRange {
            key: "repetition_penalty",
            label: "Repetition penalty",
            min: 0.01,
            max: 5.0,
            default: 1.0,
            integer: false,
        },
        SettingRange {
            key: "max_tokens",
            label: "Max tokens",
            min: 1.0,
            max: 32000.0,
            default: 2000.0,
            integer: true,
        },
    ]
});

pub const GENRES: [&str; 8] = [
    "Fantasy",
    "Sci-Fi",
    "Mystery",
    "Romance",
    "Horror",
    "Historical",
    "Cyberpunk",
    "Thriller",
];

pub const WRITING_STYLES: [&str; 5] = [
    "Concise",
    "Descriptive",
    "Poetic",
    "Fast-Paced",
    "Stream of Consciousness",
];

pub const POINTS_OF_VIEW: [&str; 4] = [
    "First-Person",
    "Second-Person",
    "Third-Person Limited",
    "Third-Person Omniscient",
];

static SETTINGS_CATALOG: Lazy<Value> = Lazy::new(|| {
    let mut entries = serde_json::Map::new();
    for range in SETTING_RANGES.iter() {
        // Integer-valued settings are listed as integers so the client can
        // pick the right input widget.
        let entry = if range.integer {
            json!({
                "min": range.min as i64,
                "max": range.max as i64,
                "default": range.default as i64,
            })
        } else {
            json!({ "min": range.min, "max": range.max, "default": range.default })
        };
        entries.insert(range.key.to_string(), entry);
    }
    Value::Object(entries)
});

static NARRATIVE_CATALOG: Lazy<Value> = Lazy::new(|| {
    json!({
        "genre": GENRES,
        "writing_style": WRITING_STYLES,
        "point_of_view": POINTS_OF_VIEW,
    })
});

pub fn settings_catalog() -> &'static Value {
    &SETTINGS_CATALOG
}

pub fn narrative_catalog() -> &'static Value {
    &NARRATIVE_CATALOG
}

pub fn is_known_model(id: &str) -> bool {
    MODELS.iter().any(|model| model.id == id)
}

pub fn setting_range(key: &str) -> Option<&'static SettingRange> {
    SETTING_RANGES.iter().find(|range| range.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_listed_models_only() {
        assert!(is_known_model("meta-llama/Llama-3.3-70B-Instruct-Turbo"));
        assert!(!is_known_model("meta-llama/Llama-2-7b"));
        assert!(!is_known_model(""));
    }

    #[test]
    fn setting_ranges_cover_every_recognized_key() {
        for key in [
            "temperature",
            "top_p",
            "top_k",
            "presence_penalty",
            "frequency_penalty",
            "repetition_penalty",
            "max_tokens",
        ] {
            assert!(setting_range(key).is_some(), "missing range for {key}");
        }
        assert!(setting_range("n").is_none());
    }

    #[test]
    fn catalogs_are_idempotent() {
        assert_eq!(settings_catalog(), settings_catalog());
        assert_eq!(narrative_catalog(), narrative_catalog());
        let first = serde_json::to_string(&*MODELS).unwrap();
        let second = serde_json::to_string(&*MODELS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn integer_settings_are_listed_as_integers() {
        let catalog = settings_catalog();
        assert!(catalog["max_tokens"]["default"].is_i64());
        assert!(catalog["top_k"]["max"].is_i64());
        assert!(catalog["temperature"]["default"].is_f64());
    }
}

use serde::Deserialize;
use std::{env, fs, path::Path};
use tracing::info;

/// Comma-separated list of completion-service credentials.
pub const COMPLETION_KEYS_VAR: &str = "COMPLETION_API_KEYS";
/// Single fallback completion credential, used when the list is unset.
pub const COMPLETION_KEY_VAR: &str = "COMPLETION_API_KEY";
/// Credential for the vision transcription service.
pub const VISION_KEY_VAR: &str = "VISION_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub vision: VisionSection,
    #[serde(default)]
    pub matching: MatchingSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionSection {
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionSection {
    #[serde(default = "default_vision_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSection {
    /// Short tokens that still qualify for the local fallback matcher,
    /// even below its length cutoff.
    #[serde(default = "default_priority_keywords")]
    pub priority_keywords: Vec<String>,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_priority_keywords() -> Vec<String> {
    ["pen", "ink", "ram", "ssd", "usb", "cpu"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            model: default_completion_model(),
        }
    }
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            model: default_vision_model(),
        }
    }
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            priority_keywords: default_priority_keywords(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the TOML config, falling back to defaults when the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                info!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "No usable config file, using defaults"
                );
                Self::default()
            }
        }
    }
}

/// Credentials are read only from the environment, never from the TOML file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub completion_keys: Vec<String>,
    pub vision_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let mut completion_keys: Vec<String> = env::var(COMPLETION_KEYS_VAR)
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if completion_keys.is_empty() {
            if let Ok(single) = env::var(COMPLETION_KEY_VAR) {
                let single = single.trim().to_string();
                if !single.is_empty() {
                    completion_keys.push(single);
                }
            }
        }

        let vision_key = env::var(VISION_KEY_VAR)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        info!(
            completion_keys = completion_keys.len(),
            has_vision_key = vision_key.is_some(),
            "Loaded credentials from environment"
        );

        Self {
            completion_keys,
            vision_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.completion.base_url, "https://api.openai.com/v1");
        assert!(!cfg.matching.priority_keywords.is_empty());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [completion]
            model = "custom-model"

            [matching]
            priority_keywords = ["hdd"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.completion.model, "custom-model");
        assert_eq!(cfg.completion.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.matching.priority_keywords, vec!["hdd".to_string()]);
    }
}

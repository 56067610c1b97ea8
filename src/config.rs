use std::env;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use log::warn;

/// Main configuration structure for study_buddy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion service settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Pipeline behaviour
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// UI display configuration
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider label used in logs and events
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Token limit for generated answers
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature setting
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ask the model for a JSON analysis of each query
    #[serde(default = "default_analyze_input")]
    pub analyze_input: bool,

    /// Interactions handed to the renderer per turn
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Prior turns replayed to the model as chat history
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colorful output
    #[serde(default = "default_colorful")]
    pub colorful: bool,
}

// Default value functions
fn default_provider_name() -> String { "groq".to_string() }
fn default_base_url() -> String { "https://api.groq.com/openai/v1".to_string() }
fn default_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_api_key_env() -> String { "GROQ_API_KEY".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.7 }
fn default_timeout_secs() -> u64 { 60 }
fn default_analyze_input() -> bool { true }
fn default_context_window() -> usize { crate::session::DEFAULT_CONTEXT_WINDOW }
fn default_history_turns() -> usize { crate::generator::HISTORY_TURNS }
fn default_colorful() -> bool { true }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyze_input: default_analyze_input(),
            context_window: default_context_window(),
            history_turns: default_history_turns(),
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self { colorful: default_colorful() }
    }
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// A missing key is not an error here; the completion service reports it.
    pub fn api_key(&self) -> String {
        match env::var(&self.api_key_env) {
            Ok(key) => key,
            Err(_) => {
                warn!("{} is not set; requests will be sent without credentials", self.api_key_env);
                String::new()
            }
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(shellexpand::tilde(path).as_ref());
        }

        let default_paths = [
            "study_buddy.toml",
            ".study_buddy.toml",
            "~/.config/study_buddy/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(&mut self, no_color: bool) {
        if no_color {
            self.ui.colorful = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_settings() {
        let config = Config::default();
        assert_eq!(config.provider.model, "llama-3.3-70b-versatile");
        assert_eq!(config.provider.max_tokens, 2048);
        assert!((config.provider.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.provider.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.pipeline.context_window, 5);
        assert_eq!(config.pipeline.history_turns, 3);
        assert!(config.pipeline.analyze_input);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [provider]
            model = "llama-3.1-8b-instant"
            temperature = 0.2

            [pipeline]
            analyze_input = false
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.model, "llama-3.1-8b-instant");
        assert!((config.provider.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.provider.max_tokens, 2048);
        assert!(!config.pipeline.analyze_input);
        assert_eq!(config.pipeline.context_window, 5);
        assert!(config.ui.colorful);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.provider.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::from_toml("[provider\nmodel = 1").is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::load(&Some("/nonexistent/study_buddy.toml".to_string())).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        config.merge_with_args(true);
        assert!(!config.ui.colorful);
    }
}

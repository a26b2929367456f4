mod chat;
mod llm;
mod observability;
mod supabase;
mod weather;

pub use chat::*;
pub use llm::*;
pub use observability::*;
pub use supabase::*;
pub use weather::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_SERVICE_KEY: &str = "SUPABASE_SERVICE_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_TOMORROW_IO_API_KEY: &str = "TOMORROW_IO_API_KEY";
pub const ENV_GEOCODE_API_KEY: &str = "GEOCODE_API_KEY";
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";

impl Config {
    /// Overlay values produced by `lookup` (an environment accessor).
    ///
    /// Empty and whitespace-only values count as unset.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(ENV_SUPABASE_URL) {
            self.supabase.url = Some(v);
        }
        if let Some(v) = get(ENV_SUPABASE_SERVICE_KEY) {
            self.supabase.service_key = Some(v);
        }
        if let Some(v) = get(ENV_OPENAI_API_KEY) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get(ENV_TOMORROW_IO_API_KEY) {
            self.weather.weather_api_key = Some(v);
        }
        if let Some(v) = get(ENV_GEOCODE_API_KEY) {
            self.weather.geocode_api_key = Some(v);
        }
        if let Some(v) = get(ENV_LLM_MODEL) {
            self.llm.model = v;
        }
        if let Some(v) = get(ENV_OPENAI_BASE_URL) {
            self.llm.base_url = v;
        }
    }

    /// The chat model the weather agent should use.
    pub fn weather_model(&self) -> &str {
        self.weather.model.as_deref().unwrap_or(&self.llm.model)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Missing credentials are warnings: the chat reports them per turn and
    /// the weather tools fall back to dummy answers.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if self.llm.api_key.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.api_key".into(),
                message: format!("no API key configured (set {ENV_OPENAI_API_KEY})"),
            });
        }

        if self.supabase.url.is_none() || self.supabase.service_key.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "supabase".into(),
                message: format!(
                    "vector store not configured (set {ENV_SUPABASE_URL} and {ENV_SUPABASE_SERVICE_KEY})"
                ),
            });
        }

        if self.supabase.match_count == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supabase.match_count".into(),
                message: "match_count must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}

//! Application settings: an optional TOML file overridden by the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::chat_model::ModelSettings;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "WEATHER_AGENT_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where conversation checkpoints are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for CheckpointBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CheckpointBackend::Memory),
            "sqlite" => Ok(CheckpointBackend::Sqlite),
            other => Err(ConfigError::Invalid {
                field: "checkpoint.backend".to_string(),
                message: format!("expected 'memory' or 'sqlite', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSection {
    /// `google_genai` or `openai`; inferred from `name` when unset
    pub provider: Option<String>,
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_url: Option<String>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            provider: None,
            name: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 30,
            max_retries: 2,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { max_iterations: 25 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: CheckpointBackend,
    pub sqlite_url: String,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            sqlite_url: "sqlite://weather_agent.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSection,
    pub agent: AgentSection,
    pub checkpoint: CheckpointSection,
}

impl Settings {
    /// Load settings from `WEATHER_AGENT_CONFIG` if set, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, falling back to `WEATHER_AGENT_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let mut settings = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
                Self::from_toml_str(&content)?
            }
            None => Settings::default(),
        };

        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `WEATHER_AGENT_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("WEATHER_AGENT_MODEL") {
            self.model.name = model;
        }
        if let Some(provider) = get("WEATHER_AGENT_PROVIDER") {
            self.model.provider = Some(provider);
        }
        if let Some(value) = get("WEATHER_AGENT_TEMPERATURE") {
            self.model.temperature = parse_value("WEATHER_AGENT_TEMPERATURE", &value)?;
        }
        if let Some(value) = get("WEATHER_AGENT_MAX_TOKENS") {
            self.model.max_tokens = parse_value("WEATHER_AGENT_MAX_TOKENS", &value)?;
        }
        if let Some(value) = get("WEATHER_AGENT_TIMEOUT_SECS") {
            self.model.timeout_secs = parse_value("WEATHER_AGENT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("WEATHER_AGENT_CHECKPOINT") {
            self.checkpoint.backend = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid {
                field: "model.temperature".to_string(),
                message: format!("{} is outside 0.0..=2.0", self.model.temperature),
            });
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                field: "model.max_tokens".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "agent.max_iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Options for [`init_chat_model`](crate::init_chat_model)
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            provider: self.model.provider.clone(),
            temperature: Some(self.model.temperature),
            max_tokens: Some(self.model.max_tokens),
            timeout: (self.model.timeout_secs > 0).then(|| Duration::from_secs(self.model.timeout_secs)),
            max_retries: self.model.max_retries,
            api_key: None,
            base_url: self.model.base_url.clone(),
        }
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field: field.to_string(),
        message: format!("'{}': {}", value, e),
    })
}

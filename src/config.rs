//! Run configuration
//!
//! Loaded once from a JSON file. Example:
//!
//! ```json
//! {
//!   "attackbox": "attackbox",
//!   "llm": { "model_id": "llama3.1:8b", "temperature": 0.6, "top_p": 0.9 },
//!   "planner": {
//!     "system_prompt": "You are a CTF player...",
//!     "user_prompt": "Summary so far:\n{summarized_history}\n"
//!   },
//!   "summarizer": {
//!     "system_prompt": "You condense pentest notes...",
//!     "user_prompt": "{summarized_history}\n\nNew:\n{new_observation}"
//!   },
//!   "target_text": "Find the flag.",
//!   "max_tries": 20,
//!   "timeout_duration": 10,
//!   "new_observation_length_limit": 2000
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agent::{AgentConfig, MissingPlaceholder, PromptTemplates};
use crate::ollama::SamplingConfig;
use crate::sandbox::docker::{default_setup_commands, DEFAULT_IMAGE};

/// Text generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Ollama model name
    pub model_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default)]
    pub do_sample: bool,
}

impl LlmConfig {
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            do_sample: self.do_sample,
            max_new_tokens: self.max_new_tokens,
        }
    }
}

/// System and user prompt for one model role
#[derive(Debug, Clone, Deserialize)]
pub struct PromptPair {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Name of the sandbox container
    #[serde(default = "default_attackbox")]
    pub attackbox: String,
    #[serde(default = "default_image")]
    pub image: String,
    /// Host directory bind-mounted at /data in the sandbox, if it exists
    #[serde(default)]
    pub host_data_dir: Option<PathBuf>,
    /// Shell commands run once inside a newly created sandbox
    #[serde(default = "default_setup_commands")]
    pub setup_commands: Vec<String>,
    pub llm: LlmConfig,
    pub planner: PromptPair,
    pub summarizer: PromptPair,
    /// Preamble placed before every challenge description
    #[serde(default)]
    pub target_text: String,
    #[serde(default = "default_max_tries")]
    pub max_tries: usize,
    /// Per-command timeout in seconds
    #[serde(default = "default_timeout_duration")]
    pub timeout_duration: u64,
    #[serde(default = "default_observation_limit")]
    pub new_observation_length_limit: usize,
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// OTLP collector for span export
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_attackbox() -> String {
    "attackbox".to_string()
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f64 {
    0.6
}

fn default_top_p() -> f64 {
    0.9
}

fn default_max_new_tokens() -> u32 {
    1024
}

fn default_max_tries() -> usize {
    20
}

fn default_timeout_duration() -> u64 {
    10
}

fn default_observation_limit() -> usize {
    2000
}

fn default_verbose() -> bool {
    true
}

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    MissingPlaceholder(MissingPlaceholder),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::MissingPlaceholder(e) => write!(f, "Invalid prompt template: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<MissingPlaceholder> for ConfigError {
    fn from(e: MissingPlaceholder) -> Self {
        ConfigError::MissingPlaceholder(e)
    }
}

impl AppConfig {
    /// Read and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model_id.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model_id is empty".to_string()));
        }
        if self.new_observation_length_limit == 0 {
            return Err(ConfigError::Invalid(
                "new_observation_length_limit must be positive".to_string(),
            ));
        }
        if self.timeout_duration == 0 {
            return Err(ConfigError::Invalid(
                "timeout_duration must be positive".to_string(),
            ));
        }
        self.prompts()?;
        Ok(())
    }

    /// Planner and summarizer templates, checked for their placeholders
    pub fn prompts(&self) -> Result<PromptTemplates, ConfigError> {
        Ok(PromptTemplates::new(
            self.planner.system_prompt.as_str(),
            self.planner.user_prompt.as_str(),
            self.summarizer.system_prompt.as_str(),
            self.summarizer.user_prompt.as_str(),
        )?)
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_tries: self.max_tries,
            timeout_secs: self.timeout_duration,
            observation_limit: self.new_observation_length_limit,
            sampling: self.llm.sampling(),
            verbose: self.verbose,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

/// Immutable application configuration, resolved once at startup and passed
/// explicitly to the components that need it. Nothing reads settings from the
/// process environment after this has been built (the API key and base URL
/// are resolved alongside it in `main`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub caption: CaptionConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory scanned for input videos.
    #[serde(default = "default_input_root")]
    pub input_root: PathBuf,
    /// Base directory for caption artifacts; artifacts land in a per-model
    /// subdirectory underneath it.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Path to the response JSON schema sent along with the prompt.
    #[serde(default = "default_schema_path")]
    pub schema: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_root: default_input_root(),
            output_root: default_output_root(),
            schema: default_schema_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on how many videos one run will attempt.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Randomize batch order before truncating to `max_items`.
    #[serde(default = "default_true")]
    pub shuffle: bool,
    /// Number of concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Frame sampling rate forwarded to the inference service.
    #[serde(default = "default_fps")]
    pub frame_sampling_fps: f64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_items: default_max_items(),
            shuffle: true,
            concurrency: default_concurrency(),
            frame_sampling_fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptsConfig {
    #[serde(default = "default_system_prompt")]
    pub system: String,
    #[serde(default = "default_user_prompt")]
    pub user: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
            user: default_user_prompt(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SafetyConfig {
    /// Pause between items on each worker, on top of the rate window.
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: f64,
    /// Requests-per-minute budget used when a model has no explicit entry in
    /// `rate_limits`.
    #[serde(default = "default_rpm")]
    pub default_rpm: u32,
    /// Per-model budgets keyed by model identifier.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            request_delay_secs: default_request_delay(),
            default_rpm: default_rpm(),
            rate_limits: HashMap::new(),
        }
    }
}

/// Per-model rate budgets.
///
/// `tpm` is accepted so existing config files round-trip, but only the
/// request-per-minute budget is enforced by the admission controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub rpm: u32,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            caption: CaptionConfig::default(),
            prompts: PromptsConfig::default(),
            safety: SafetyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the dispatcher is not defined for.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.caption.model.trim().is_empty() {
            return Err(ConfigError::Invalid("caption.model must not be empty".into()));
        }
        if self.caption.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "caption.concurrency must be at least 1".into(),
            ));
        }
        if self.caption.max_items == 0 {
            return Err(ConfigError::Invalid(
                "caption.max_items must be at least 1".into(),
            ));
        }
        let fps = self.caption.frame_sampling_fps;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ConfigError::Invalid(
                "caption.frame_sampling_fps must be positive".into(),
            ));
        }
        let delay = self.safety.request_delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::Invalid(
                "safety.request_delay_secs must be a non-negative number".into(),
            ));
        }
        if self.safety.default_rpm == 0 {
            return Err(ConfigError::Invalid(
                "safety.default_rpm must be at least 1".into(),
            ));
        }
        for (model, limits) in &self.safety.rate_limits {
            if limits.rpm == 0 {
                return Err(ConfigError::Invalid(format!(
                    "safety.rate_limits.{model}.rpm must be at least 1"
                )));
            }
            if limits.tpm == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "safety.rate_limits.{model}.tpm must be at least 1"
                )));
            }
        }
        if self.prompts.system.trim().is_empty() || self.prompts.user.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "prompts.system and prompts.user must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Requests-per-minute budget for the given model.
    pub fn rpm_for(&self, model: &str) -> u32 {
        self.safety
            .rate_limits
            .get(model)
            .map(|l| l.rpm)
            .unwrap_or(self.safety.default_rpm)
    }

    /// Directory where this run's artifacts live.
    pub fn artifact_dir(&self) -> PathBuf {
        self.paths.output_root.join(&self.caption.model)
    }

    /// Load the response JSON schema referenced by `paths.schema`.
    pub fn load_schema(&self) -> Result<serde_json::Value, ConfigError> {
        let path = &self.paths.schema;
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Schema {
            path: path.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_input_root() -> PathBuf {
    PathBuf::from("input")
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("configs/video_response.schema.json")
}

fn default_model() -> String {
    "qwen-vl-plus".to_string()
}

fn default_max_items() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

fn default_fps() -> f64 {
    1.0
}

fn default_request_delay() -> f64 {
    0.5
}

fn default_rpm() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_system_prompt() -> String {
    String::new()
}

fn default_user_prompt() -> String {
    String::new()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

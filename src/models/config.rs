use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::RetryConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_TEXT_COLUMN: &str = "text";
pub const DEFAULT_OUTPUT_PATH: &str = "embeddings.jsonl";
pub const DEFAULT_CHECKPOINT_PATH: &str = "embeddings.checkpoint.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// A configuration together with the file it was read from, if any.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("batch-embed").join("config.toml"))
    }

    /// Load configuration from `explicit`, else the global config file, else defaults.
    ///
    /// An explicit path that does not exist is an error; a missing global file is not.
    pub fn load(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::PathError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(ResolvedConfig {
                config: Self::read(path)?,
                path: Some(path.to_path_buf()),
            });
        }

        if let Some(path) = Self::global_path()
            && path.exists()
        {
            return Ok(ResolvedConfig {
                config: Self::read(&path)?,
                path: Some(path),
            });
        }

        Ok(ResolvedConfig {
            config: Self::default(),
            path: None,
        })
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.pipeline.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API (the `/embeddings` path is appended).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Requested vector length; also the length every returned vector must have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            dimensions: None,
            timeout_secs: default_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl EmbeddingConfig {
    /// Full URL of the embeddings endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("embedding.base_url is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("embedding.model is empty".into()));
        }
        if self.dimensions == Some(0) {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "embedding.api_key_env is empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Save a checkpoint each time this many records have been completed.
    #[serde(default = "default_checkpoint_frequency")]
    pub checkpoint_frequency: usize,

    /// Attempts per batch, the first one included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// One backoff time unit; attempt `n` waits `2^(n-1)` units.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Pause between consecutive batches.
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_text_column")]
    pub text_column: String,

    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_batch_size() -> usize {
    100
}

fn default_checkpoint_frequency() -> usize {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_inter_batch_delay_ms() -> u64 {
    1000
}

fn default_text_column() -> String {
    DEFAULT_TEXT_COLUMN.to_string()
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_PATH)
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_frequency: default_checkpoint_frequency(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            text_column: default_text_column(),
            checkpoint_path: default_checkpoint_path(),
            output_path: default_output_path(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.batch_size must be > 0".into(),
            ));
        }
        if self.checkpoint_frequency == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.checkpoint_frequency must be > 0".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_retries must be > 0".into(),
            ));
        }
        if self.text_column.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.text_column is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.backoff_unit_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

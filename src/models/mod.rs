mod config;
mod format;
mod record;

pub use config::{
    Config, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_CHECKPOINT_PATH, DEFAULT_MODEL,
    DEFAULT_OUTPUT_PATH, DEFAULT_TEXT_COLUMN, EmbeddingConfig, PipelineConfig, ResolvedConfig,
};
pub use format::{DataFormat, OutputFormat};
pub use record::{Embedding, Record, RunState, observed_dimension, resume_point};

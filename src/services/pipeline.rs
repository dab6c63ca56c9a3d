//! Resumable batch embedding over a record collection.
//!
//! Records are processed strictly in order, one batch at a time. Progress is checkpointed every
//! `checkpoint_frequency` records, and a run restarted from a checkpoint continues after the
//! last embedded record. Only configuration problems stop a run before it starts; a batch that
//! keeps failing is marked absent and the run moves on.

use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ConfigError, PipelineError};
use crate::models::{Config, Embedding, Record, RunState, observed_dimension, resume_point};
use crate::services::batch::{BatchStatus, process_batch};
use crate::services::checkpoint::{Checkpoint, CheckpointStore};
use crate::services::dataset::{OutputSink, input_fingerprint};
use crate::services::embedding::EmbeddingService;
use crate::utils::RetryConfig;

/// Validated knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    batch_size: usize,
    checkpoint_frequency: usize,
    retry: RetryConfig,
    inter_batch_delay: Duration,
    dimensions: Option<usize>,
}

impl PipelineOptions {
    /// Options with a one second backoff unit and a one second pause between batches.
    pub fn new(
        batch_size: usize,
        checkpoint_frequency: usize,
        max_retries: u32,
    ) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::ValidationError("batch size must be > 0".into()));
        }
        if checkpoint_frequency == 0 {
            return Err(ConfigError::ValidationError(
                "checkpoint frequency must be > 0".into(),
            ));
        }
        if max_retries == 0 {
            return Err(ConfigError::ValidationError("max retries must be > 0".into()));
        }

        Ok(Self {
            batch_size,
            checkpoint_frequency,
            retry: RetryConfig::new(max_retries),
            inter_batch_delay: Duration::from_secs(1),
            dimensions: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = &config.pipeline;
        Ok(Self {
            batch_size: pipeline.batch_size,
            checkpoint_frequency: pipeline.checkpoint_frequency,
            retry: pipeline.retry_config(),
            inter_batch_delay: pipeline.inter_batch_delay(),
            dimensions: config.embedding.dimensions,
        })
    }

    #[must_use]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.retry = self.retry.with_initial_delay(unit);
        self
    }

    #[must_use]
    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    /// Require every vector to have this length.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn checkpoint_frequency(&self) -> usize {
        self.checkpoint_frequency
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    /// Index the run started from (0 unless resumed).
    pub resumed_from: usize,
    /// Records that went through a batch in this run.
    pub attempted: usize,
    /// Texts sent to the embedding service.
    pub submitted: usize,
    /// Records skipped because their text was missing or blank.
    pub empty_text: usize,
    /// Records holding a vector at the end.
    pub embedded: usize,
    /// Records marked absent at the end.
    pub absent: usize,
    pub batches: usize,
    pub degraded_batches: usize,
    pub remote_calls: u64,
    pub checkpoints_written: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub records: Vec<Record>,
    pub summary: RunSummary,
}

/// Batch embedding pipeline wired to its collaborators.
pub struct Pipeline<'a> {
    service: &'a dyn EmbeddingService,
    store: &'a dyn CheckpointStore,
    sink: &'a dyn OutputSink,
    options: PipelineOptions,
    progress: ProgressBar,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        service: &'a dyn EmbeddingService,
        store: &'a dyn CheckpointStore,
        sink: &'a dyn OutputSink,
        options: PipelineOptions,
    ) -> Self {
        Self {
            service,
            store,
            sink,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-record progress on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Embed `records`, resuming from the store's checkpoint when there is one.
    ///
    /// On success the output has been written and the checkpoint removed. Batch failures do
    /// not surface here; they leave absent records behind.
    pub async fn run(&self, records: Vec<Record>) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        let fingerprint = input_fingerprint(&records);
        let model = self.service.model().to_string();

        let mut records = match self.store.load()? {
            Some(checkpoint) => {
                self.check_checkpoint(&checkpoint, &fingerprint, &model)?;
                let state = checkpoint.state();
                info!(
                    saved_at = %checkpoint.saved_at,
                    embedded = state.embedded,
                    absent = state.absent,
                    "resuming from checkpoint"
                );
                checkpoint.records
            }
            None => {
                let mut records = records;
                for record in &mut records {
                    record.embedding = Embedding::Pending;
                }
                records
            }
        };

        let total = records.len();
        let start_index = resume_point(&records);
        let mut dimension = self.options.dimensions.or_else(|| observed_dimension(&records));
        let batch_size = self.options.batch_size;
        let frequency = self.options.checkpoint_frequency;

        info!(
            total,
            start_index,
            batch_size,
            batches = (total - start_index).div_ceil(batch_size),
            "starting embedding run"
        );

        self.progress.set_length(total as u64);
        self.progress.set_position(start_index as u64);

        let mut summary = RunSummary {
            total,
            resumed_from: start_index,
            ..Default::default()
        };

        let mut start = start_index;
        while start < total {
            let end = (start + batch_size).min(total);
            let outcome = process_batch(
                self.service,
                &self.options.retry,
                &mut records[start..end],
                dimension,
            )
            .await;

            summary.batches += 1;
            summary.attempted += end - start;
            summary.submitted += outcome.valid;
            summary.empty_text += outcome.invalid;
            summary.remote_calls += u64::from(outcome.attempts);
            match outcome.status {
                BatchStatus::Embedded => {
                    if dimension.is_none() {
                        dimension = observed_dimension(&records[start..end]);
                    }
                }
                BatchStatus::Degraded { .. } => summary.degraded_batches += 1,
                BatchStatus::Skipped => {}
            }
            debug!(start, end, attempts = outcome.attempts, "batch done");

            if end / frequency > start / frequency || end == total {
                self.store
                    .save(&Checkpoint::new(&model, &fingerprint, records.clone()))?;
                summary.checkpoints_written += 1;
                debug!(processed = end, "checkpoint saved");
            }

            self.progress.set_position(end as u64);
            start = end;

            if start < total && !self.options.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.options.inter_batch_delay).await;
            }
        }

        self.sink.write(&records)?;
        self.store.clear()?;
        self.progress.finish_and_clear();

        let state = RunState::from_records(&records);
        summary.embedded = state.embedded;
        summary.absent = state.absent;
        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            total = summary.total,
            attempted = summary.attempted,
            empty_text = summary.empty_text,
            embedded = summary.embedded,
            absent = summary.absent,
            remote_calls = summary.remote_calls,
            "embedding run complete"
        );

        Ok(RunOutcome { records, summary })
    }

    fn check_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        fingerprint: &str,
        model: &str,
    ) -> Result<(), PipelineError> {
        if checkpoint.input_fingerprint != fingerprint {
            return Err(PipelineError::CheckpointMismatch(format!(
                "input changed: checkpoint holds {} records",
                checkpoint.records.len()
            )));
        }
        if checkpoint.model != model {
            return Err(PipelineError::CheckpointMismatch(format!(
                "checkpoint model '{}' differs from configured model '{}'",
                checkpoint.model, model
            )));
        }
        Ok(())
    }
}

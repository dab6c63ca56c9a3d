//! Embed command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cli::output::{Formatter, RunPlan, RunTarget, get_formatter};
use crate::models::{Config, OutputFormat, Record, resume_point};
use crate::services::{
    CheckpointStore, EmbeddingClient, FileCheckpointStore, OutputFile, Pipeline, PipelineOptions,
    input_fingerprint, load_records,
};

/// Arguments for the embed command.
#[derive(Debug, Args)]
pub struct EmbedArgs {
    /// Input table: .csv, .json, .jsonl/.ndjson (use - for JSON on stdin)
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Output file; .csv writes a wide table, anything else JSONL
    #[arg(long, short = 'o', env = "BATCH_EMBED_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Checkpoint file used to resume interrupted runs
    #[arg(long, env = "BATCH_EMBED_CHECKPOINT")]
    pub checkpoint: Option<PathBuf>,

    /// Column holding the text to embed
    #[arg(long, short = 't')]
    pub text_column: Option<String>,

    /// Records per embedding request
    #[arg(long, short = 'b', env = "BATCH_EMBED_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Save a checkpoint every N records
    #[arg(long)]
    pub checkpoint_frequency: Option<usize>,

    /// Attempts per batch, the first one included
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Discard an existing checkpoint and start over
    #[arg(long)]
    pub fresh: bool,

    /// Report what would be embedded without calling the API
    #[arg(long)]
    pub dry_run: bool,
}

impl EmbedArgs {
    /// Overlay command line values on the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        let pipeline = &mut config.pipeline;
        if let Some(ref output) = self.output {
            pipeline.output_path = output.clone();
        }
        if let Some(ref checkpoint) = self.checkpoint {
            pipeline.checkpoint_path = checkpoint.clone();
        }
        if let Some(ref column) = self.text_column {
            pipeline.text_column = column.clone();
        }
        if let Some(size) = self.batch_size {
            pipeline.batch_size = size;
        }
        if let Some(freq) = self.checkpoint_frequency {
            pipeline.checkpoint_frequency = freq;
        }
        if let Some(retries) = self.max_retries {
            pipeline.max_retries = retries;
        }
    }
}

/// Handle the embed command.
pub async fn handle_embed(
    args: EmbedArgs,
    mut config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    let options = PipelineOptions::from_config(&config)?;
    let formatter = get_formatter(format);

    let records = load_records(&args.input, &config.pipeline.text_column)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!(input = %args.input.display(), records = records.len(), "input loaded");

    let store = FileCheckpointStore::new(&config.pipeline.checkpoint_path);
    if args.dry_run {
        return dry_run(&args, &config, &options, &store, &records, formatter.as_ref());
    }

    // the checkpoint is only discarded once the run is able to start
    let client = EmbeddingClient::from_env(&config.embedding)?;
    if args.fresh {
        store.clear().context("failed to discard checkpoint")?;
        info!(path = %store.path().display(), "existing checkpoint discarded");
    }
    let sink = OutputFile::from_path(&config.pipeline.output_path);

    let progress = if format == OutputFormat::Text && !verbose {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .context("invalid progress template")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let outcome = Pipeline::new(&client, &store, &sink, options)
        .with_progress(progress)
        .run(records)
        .await?;

    let target = RunTarget {
        output: sink.path().to_path_buf(),
        model: config.embedding.model.clone(),
    };
    print!("{}", formatter.format_run_summary(&outcome.summary, &target));

    if outcome.summary.absent > 0 {
        eprintln!(
            "Note: {} records have no embedding (empty text or failed batches).",
            outcome.summary.absent
        );
    }

    Ok(())
}

fn dry_run(
    args: &EmbedArgs,
    config: &Config,
    options: &PipelineOptions,
    store: &FileCheckpointStore,
    records: &[Record],
    formatter: &dyn Formatter,
) -> Result<()> {
    let existing = if args.fresh { None } else { store.load()? };
    let start_index = match existing {
        Some(checkpoint) if checkpoint.input_fingerprint == input_fingerprint(records) => {
            resume_point(&checkpoint.records)
        }
        Some(_) => {
            warn!(
                path = %store.path().display(),
                "checkpoint belongs to a different input; a real run would refuse to start"
            );
            0
        }
        None => 0,
    };

    let remaining = records.len() - start_index.min(records.len());
    let plan = RunPlan {
        input: args.input.clone(),
        records: records.len(),
        embeddable: records
            .iter()
            .filter(|r| r.embeddable_text().is_some())
            .count(),
        start_index,
        batches: remaining.div_ceil(options.batch_size()),
        batch_size: options.batch_size(),
        checkpoint_frequency: options.checkpoint_frequency(),
        endpoint: config.embedding.endpoint(),
        model: config.embedding.model.clone(),
    };

    print!("{}", formatter.format_plan(&plan));
    Ok(())
}

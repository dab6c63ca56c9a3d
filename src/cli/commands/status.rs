use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::{CheckpointStatus, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{CheckpointStore, FileCheckpointStore};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Checkpoint file to inspect (defaults to the configured path)
    #[arg(long, env = "BATCH_EMBED_CHECKPOINT")]
    pub checkpoint: Option<PathBuf>,
}

pub async fn handle_status(args: StatusArgs, config: Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let path = args
        .checkpoint
        .unwrap_or_else(|| config.pipeline.checkpoint_path.clone());

    let status = checkpoint_status(&FileCheckpointStore::new(path))?;
    print!("{}", formatter.format_checkpoint_status(&status));

    if status.exists && !status.complete {
        eprintln!();
        eprintln!("Hint: rerun `batch-embed embed` with the same input to resume.");
    }

    Ok(())
}

fn checkpoint_status(store: &FileCheckpointStore) -> Result<CheckpointStatus> {
    let path = store.path().to_path_buf();
    let Some(checkpoint) = store.load()? else {
        return Ok(CheckpointStatus {
            path,
            exists: false,
            complete: false,
            model: None,
            saved_at: None,
            total: 0,
            next_index: 0,
            embedded: 0,
            absent: 0,
            pending: 0,
        });
    };

    let state = checkpoint.state();
    Ok(CheckpointStatus {
        path,
        exists: true,
        complete: state.is_complete(),
        model: Some(checkpoint.model),
        saved_at: Some(checkpoint.saved_at),
        total: state.total,
        next_index: state.next_index,
        embedded: state.embedded,
        absent: state.absent,
        pending: state.pending,
    })
}

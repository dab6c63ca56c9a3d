mod batch;
mod checkpoint;
mod dataset;
mod embedding;
mod pipeline;

pub use batch::{BatchOutcome, BatchStatus, process_batch};
pub use checkpoint::{
    CHECKPOINT_VERSION, Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use dataset::{
    OutputFile, OutputSink, input_fingerprint, load_records, parse_csv_records,
    parse_json_records,
};
pub use embedding::{EmbeddingClient, EmbeddingService};
pub use pipeline::{Pipeline, PipelineOptions, RunOutcome, RunSummary};

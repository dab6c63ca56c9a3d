use std::fmt::Write as FmtWrite;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::OutputFormat;
use crate::services::RunSummary;

pub trait Formatter {
    fn format_run_summary(&self, summary: &RunSummary, output: &RunTarget) -> String;
    fn format_checkpoint_status(&self, status: &CheckpointStatus) -> String;
    fn format_plan(&self, plan: &RunPlan) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

/// Where a run wrote its results.
#[derive(Debug, Clone, Serialize)]
pub struct RunTarget {
    pub output: PathBuf,
    pub model: String,
}

/// What is on disk at a checkpoint path.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointStatus {
    pub path: PathBuf,
    pub exists: bool,
    /// Every record has been attempted.
    pub complete: bool,
    pub model: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub next_index: usize,
    pub embedded: usize,
    pub absent: usize,
    pub pending: usize,
}

/// What `embed --dry-run` would do.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub input: PathBuf,
    pub records: usize,
    pub embeddable: usize,
    pub start_index: usize,
    pub batches: usize,
    pub batch_size: usize,
    pub checkpoint_frequency: usize,
    pub endpoint: String,
    pub model: String,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_summary(&self, summary: &RunSummary, target: &RunTarget) -> String {
        let mut output = String::new();
        writeln!(output, "Embedding Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        writeln!(output, "Model:       {}", target.model).unwrap();
        writeln!(output, "Records:     {}", summary.total).unwrap();
        if summary.resumed_from > 0 {
            writeln!(output, "Resumed at:  {}", summary.resumed_from).unwrap();
        }
        writeln!(output, "Empty text:  {}", summary.empty_text).unwrap();
        writeln!(output, "Embedded:    {}", summary.embedded).unwrap();
        writeln!(output, "Absent:      {}", summary.absent).unwrap();
        writeln!(
            output,
            "Batches:     {} ({} degraded)",
            summary.batches, summary.degraded_batches
        )
        .unwrap();
        writeln!(output, "API calls:   {}", summary.remote_calls).unwrap();
        writeln!(output, "Checkpoints: {}", summary.checkpoints_written).unwrap();
        writeln!(output, "Duration:    {}ms", summary.duration_ms).unwrap();
        writeln!(output, "Output:      {}", target.output.display()).unwrap();
        output
    }

    fn format_checkpoint_status(&self, status: &CheckpointStatus) -> String {
        let mut output = String::new();
        writeln!(output, "Checkpoint").unwrap();
        writeln!(output, "----------").unwrap();
        writeln!(output, "Path:      {}", status.path.display()).unwrap();

        if !status.exists {
            writeln!(output, "State:     [NONE]").unwrap();
            return output;
        }

        let state = if status.complete {
            "[COMPLETE]"
        } else {
            "[IN PROGRESS]"
        };
        writeln!(output, "State:     {}", state).unwrap();
        if let Some(ref model) = status.model {
            writeln!(output, "Model:     {}", model).unwrap();
        }
        if let Some(saved_at) = status.saved_at {
            writeln!(output, "Saved at:  {}", saved_at.to_rfc3339()).unwrap();
        }
        writeln!(
            output,
            "Progress:  {}/{} (resumes at {})",
            status.embedded + status.absent,
            status.total,
            status.next_index
        )
        .unwrap();
        writeln!(output, "Embedded:  {}", status.embedded).unwrap();
        writeln!(output, "Absent:    {}", status.absent).unwrap();
        writeln!(output, "Pending:   {}", status.pending).unwrap();
        output
    }

    fn format_plan(&self, plan: &RunPlan) -> String {
        let mut output = String::new();
        writeln!(output, "Dry Run").unwrap();
        writeln!(output, "-------").unwrap();
        writeln!(output, "Input:       {}", plan.input.display()).unwrap();
        writeln!(
            output,
            "Records:     {} ({} with text)",
            plan.records, plan.embeddable
        )
        .unwrap();
        if plan.start_index > 0 {
            writeln!(output, "Resumes at:  {}", plan.start_index).unwrap();
        }
        writeln!(
            output,
            "Batches:     {} x {}",
            plan.batches, plan.batch_size
        )
        .unwrap();
        writeln!(
            output,
            "Checkpoint:  every {} records",
            plan.checkpoint_frequency
        )
        .unwrap();
        writeln!(output, "Endpoint:    {}", plan.endpoint).unwrap();
        writeln!(output, "Model:       {}", plan.model).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_run_summary(&self, summary: &RunSummary, target: &RunTarget) -> String {
        let json = serde_json::json!({
            "summary": summary,
            "output": target.output,
            "model": target.model,
        });
        self.render(&json)
    }

    fn format_checkpoint_status(&self, status: &CheckpointStatus) -> String {
        self.render(&serde_json::json!(status))
    }

    fn format_plan(&self, plan: &RunPlan) -> String {
        self.render(&serde_json::json!({ "dry_run": plan }))
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            total: 250,
            resumed_from: 100,
            attempted: 150,
            submitted: 149,
            empty_text: 1,
            embedded: 248,
            absent: 2,
            batches: 2,
            degraded_batches: 0,
            remote_calls: 3,
            checkpoints_written: 2,
            duration_ms: 42,
        }
    }

    fn target() -> RunTarget {
        RunTarget {
            output: PathBuf::from("out.jsonl"),
            model: "text-embedding-3-small".into(),
        }
    }

    #[test]
    fn test_text_summary_mentions_resume() {
        let text = TextFormatter.format_run_summary(&summary(), &target());
        assert!(text.contains("Resumed at:  100"));
        assert!(text.contains("Absent:      2"));
        assert!(text.contains("out.jsonl"));
    }

    #[test]
    fn test_json_summary_is_parseable() {
        let json = JsonFormatter::new(false).format_run_summary(&summary(), &target());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["embedded"], 248);
        assert_eq!(value["output"], "out.jsonl");
    }

    #[test]
    fn test_error_formats() {
        assert_eq!(TextFormatter.format_error("boom"), "Error: boom\n");
        let json = JsonFormatter::new(true).format_error("boom");
        let value: serde_json::Value = serde_json::from_str(json.trim_end()).unwrap();
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_missing_checkpoint_status() {
        let status = CheckpointStatus {
            path: PathBuf::from("cp.json"),
            exists: false,
            complete: false,
            model: None,
            saved_at: None,
            total: 0,
            next_index: 0,
            embedded: 0,
            absent: 0,
            pending: 0,
        };
        assert!(TextFormatter.format_checkpoint_status(&status).contains("[NONE]"));
    }
}

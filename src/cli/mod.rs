//! Command line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Resumable batch embedding for tabular text datasets.
#[derive(Debug, Parser)]
#[command(name = "batch-embed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        default_value_t = OutputFormat::Text,
        help = "Output format: text or json"
    )]
    pub format: OutputFormat,

    #[arg(long, short = 'v', global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        help = "Log filter directive, e.g. info or batch_embed=debug"
    )]
    pub log_level: Option<String>,

    #[arg(long, global = true, help = "Emit logs as JSON lines on stderr")]
    pub log_json: bool,

    #[arg(
        long,
        short = 'c',
        global = true,
        env = "BATCH_EMBED_CONFIG",
        help = "Path to a config file"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed the text column of a dataset, resuming from a checkpoint if present
    Embed(commands::EmbedArgs),

    /// Show the progress stored in a checkpoint
    Status(commands::StatusArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_embed_with_globals() {
        let cli = Cli::try_parse_from([
            "batch-embed",
            "embed",
            "--input",
            "posts.csv",
            "--batch-size",
            "50",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Embed(args) => {
                assert_eq!(args.input, PathBuf::from("posts.csv"));
                assert_eq!(args.batch_size, Some(50));
                assert!(!args.fresh);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

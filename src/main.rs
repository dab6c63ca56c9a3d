use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::warn;

use batch_embed::cli::commands::{handle_config, handle_embed, handle_status};
use batch_embed::cli::output::get_formatter;
use batch_embed::cli::{Cli, Commands};
use batch_embed::models::{Config, ResolvedConfig};
use batch_embed::telemetry::{init_tracing, resolve_level};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let level = resolve_level(cli.log_level.as_deref(), cli.verbose);
    init_tracing(&level, cli.log_json);

    let resolved = match Config::load(cli.config.as_deref()) {
        Ok(resolved) => resolved,
        // `config init` must work even when the current file is broken or missing
        Err(e) if matches!(cli.command, Commands::Config(_)) => {
            warn!("ignoring unreadable config: {e}");
            ResolvedConfig {
                config: Config::default(),
                path: None,
            }
        }
        Err(e) => return Err(e.into()),
    };

    let format = cli.format;
    tokio::select! {
        result = run_command(cli, resolved) => {
            if let Err(e) = result {
                eprint!("{}", get_formatter(format).format_error(&format!("{e:#}")));
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal; progress is kept up to the last checkpoint.");
            std::process::exit(130);
        }
    }

    Ok(())
}

async fn run_command(cli: Cli, resolved: ResolvedConfig) -> Result<()> {
    let format = cli.format;

    match cli.command {
        Commands::Embed(args) => {
            handle_embed(args, resolved.config, format, cli.verbose).await?;
        }
        Commands::Status(args) => {
            handle_status(args, resolved.config, format).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, &resolved, cli.config.as_deref(), format).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

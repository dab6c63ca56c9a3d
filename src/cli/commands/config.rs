use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat, ResolvedConfig};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, short = 'F', help = "Overwrite an existing config file")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show the configuration file path")]
    Path,
}

pub async fn handle_config(
    cmd: ConfigCommand,
    resolved: &ResolvedConfig,
    explicit: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => {
            let path = target_path(explicit)?;
            handle_init(&path, force, formatter.as_ref())
        }
        ConfigCommand::Show => handle_show(resolved, format),
        ConfigCommand::Path => handle_path(resolved, explicit, format),
    }
}

fn target_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory")),
    }
}

fn handle_init(path: &Path, force: bool, formatter: &dyn Formatter) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(path)
        .context("failed to write config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(resolved: &ResolvedConfig, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": resolved.config,
            "path": resolved.path,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match resolved.path {
        Some(ref path) => println!("# Loaded from: {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&resolved.config).context("failed to render config")?
    );
    Ok(())
}

fn handle_path(resolved: &ResolvedConfig, explicit: Option<&Path>, format: OutputFormat) -> Result<()> {
    let path = match resolved.path {
        Some(ref path) => path.clone(),
        None => target_path(explicit)?,
    };
    let active = resolved.path.is_some();

    if format == OutputFormat::Json {
        let output = serde_json::json!({ "path": path, "active": active });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if active {
        println!("Config (active): {}", path.display());
    } else {
        println!("Config (would be): {}", path.display());
    }

    Ok(())
}

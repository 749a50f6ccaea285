// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # gears host CLI
//!
//! The `gears` binary drives the host orchestrator locally.
//!
//! ## Commands
//!
//! - `gears repository create` - Provision a gear repository through a transient unit
//! - `gears paths` - Print the names and storage paths derived for a gear
//! - `gears config show|validate|generate` - Configuration management
//!
//! Logs go to stderr; stdout carries command output only.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use gears_orchestrator::commands::{self, ConfigCommand, PathsArgs, RepositoryCommand};
use gears_orchestrator_core::domain::node_config::NodeConfigManifest;

/// gears host orchestrator
#[derive(Parser)]
#[command(name = "gears")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GEARS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(long, global = true, env = "GEARS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Repository operations
    #[command(name = "repository")]
    Repository {
        #[command(subcommand)]
        command: RepositoryCommand,
    },

    /// Show derived names and paths for a gear
    #[command(name = "paths")]
    Paths(PathsArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // A broken config file is reported by the command itself
    let logging = NodeConfigManifest::load_or_default(cli.config.clone())
        .map(|config| config.logging())
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, &logging.format)?;

    match cli.command {
        Some(Commands::Repository { command }) => {
            commands::repository::handle_command(command, cli.config).await
        }
        Some(Commands::Paths(args)) => commands::paths::handle_command(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

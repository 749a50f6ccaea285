// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use gears_orchestrator_core::domain::node_config::{
    LoggingConfig, NodeConfigManifest, ObservabilityConfig,
};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./gears-config.yaml)
        #[arg(short, long, default_value = "./gears-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if as_yaml {
        print!(
            "{}",
            serde_yaml::to_string(&config).context("Failed to render configuration")?
        );
        return Ok(());
    }

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. GEARS_CONFIG_PATH: {}",
            std::env::var("GEARS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./gears-config.yaml");
        println!("  4. ~/.gears/config.yaml");
        println!("  5. /etc/gears/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(labels) = &config.metadata.labels {
        for (key, value) in labels {
            println!("  Label: {}={}", key, value);
        }
    }
    println!();

    let spec = &config.spec;
    println!("{}", "Storage:".bold());
    println!("  Base path: {}", spec.storage.base_path.display());
    for dir in spec.storage.paths().data_directories().iter().skip(1) {
        println!("    - {}", dir.display());
    }
    println!();

    println!("{}", "Repository jobs:".bold());
    println!(
        "  Owner: {}:{}",
        spec.repository.owner_uid, spec.repository.owner_gid
    );
    println!(
        "  Container: {} (mounted at {})",
        spec.repository.container_runtime, spec.repository.container_path
    );
    println!("  Slice: {}", spec.repository.slice);
    println!("  Wait timeout: {}s", spec.jobs.wait_timeout_seconds);
    println!(
        "  Unit polling: every {}ms, {} batches buffered",
        spec.jobs.poll_interval_ms, spec.jobs.poll_batch_size
    );
    println!();

    println!("{}", "systemd:".bold());
    println!(
        "  Manager: {}",
        if spec.systemd.user_mode { "user" } else { "system" }
    );
    println!("  systemctl: {}", spec.systemd.systemctl_path);
    println!("  systemd-run: {}", spec.systemd.systemd_run_path);
    println!("  journalctl: {}", spec.systemd.journalctl_path);
    println!();

    let logging = config.logging();
    println!("{}", "Logging:".bold());
    println!("  Level: {}", logging.level);
    println!("  Format: {}", logging.format);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    sample_config()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

/// Defaults for this host, with every section spelled out.
fn sample_config() -> NodeConfigManifest {
    let mut config = NodeConfigManifest::default();
    config.spec.observability = Some(ObservabilityConfig {
        logging: Some(LoggingConfig::default()),
    });
    config
}

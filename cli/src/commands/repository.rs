// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository commands
//!
//! Commands: create

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use gears_orchestrator_core::application::{
    spawn_job, CreateRepositoryJob, CreateRepositoryRequest, JobContext,
};
use gears_orchestrator_core::domain::identifier::Identifier;
use gears_orchestrator_core::domain::node_config::NodeConfigManifest;
use gears_orchestrator_core::infrastructure::{JobOutcome, WriterJobResponse};

#[derive(Subcommand)]
pub enum RepositoryCommand {
    /// Create a repository and stream the provisioning output
    Create {
        /// Repository identifier (4-32 hex characters)
        #[arg(value_name = "ID")]
        id: String,

        /// Container image that populates the repository
        #[arg(long)]
        image: String,

        /// URL handed to the container as the clone source
        #[arg(long)]
        clone_url: String,

        /// Requesting user, recorded in logs
        #[arg(long, env = "USER", default_value = "root")]
        user: String,
    },
}

pub async fn handle_command(
    command: RepositoryCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        RepositoryCommand::Create {
            id,
            image,
            clone_url,
            user,
        } => create(config_override, id, image, clone_url, user).await,
    }
}

async fn create(
    config_override: Option<PathBuf>,
    id: String,
    image: String,
    clone_url: String,
    user: String,
) -> Result<()> {
    let repository_id = Identifier::new(id).context("Invalid repository identifier")?;

    let config = NodeConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let context = Arc::new(JobContext::from_config(&config));
    let (response, outcome) = WriterJobResponse::new(Box::new(tokio::io::stdout()));
    let job = CreateRepositoryJob::new(
        CreateRepositoryRequest {
            repository_id: repository_id.clone(),
            user_id: user,
            image,
            clone_url,
        },
        Box::new(response),
        context,
    );

    info!(repository_id = %repository_id, "Submitting repository job");
    spawn_job(Box::new(job))
        .await
        .context("Repository job aborted")?;

    match outcome.get() {
        Some(JobOutcome::Accepted { .. }) => {
            eprintln!(
                "{}",
                format!("✓ Repository job for {} finished", repository_id).green()
            );
            Ok(())
        }
        Some(JobOutcome::Failed(error)) => {
            eprintln!("{} {}", "✗".red(), error);
            Err(anyhow::Error::new(error).context(format!(
                "Failed to create repository {}",
                repository_id
            )))
        }
        None => anyhow::bail!("Repository job ended without a response"),
    }
}

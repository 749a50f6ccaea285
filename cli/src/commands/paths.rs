// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Print the names and storage paths derived for a gear.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use gears_orchestrator_core::domain::identifier::{Fingerprint, Identifier};
use gears_orchestrator_core::domain::node_config::NodeConfigManifest;
use gears_orchestrator_core::domain::paths::{GearPaths, GitAccess};

#[derive(Args)]
pub struct PathsArgs {
    /// Gear identifier (4-32 hex characters)
    #[arg(value_name = "ID")]
    pub id: String,

    /// Hex-encoded key fingerprint; adds the access and key paths
    #[arg(long, value_name = "HEX")]
    pub fingerprint: Option<String>,
}

pub async fn handle_command(args: PathsArgs, config_override: Option<PathBuf>) -> Result<()> {
    let id = Identifier::new(args.id).context("Invalid gear identifier")?;
    let fingerprint = args
        .fingerprint
        .as_deref()
        .map(Fingerprint::from_hex)
        .transpose()
        .context("Fingerprint must be hex encoded")?;

    let config = NodeConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let paths = config.spec.storage.paths();

    for (label, value) in describe(&paths, &id, fingerprint.as_ref()) {
        println!("{:<18} {}", format!("{}:", label).bold(), value);
    }
    Ok(())
}

/// Labelled names and paths for `id`, in display order.
pub fn describe(
    paths: &GearPaths,
    id: &Identifier,
    fingerprint: Option<&Fingerprint>,
) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Unit", id.unit_name()),
        ("Job unit", id.job_unit_name()),
        ("Unit file", paths.unit_path_for(id).display().to_string()),
        ("Repository", paths.repository_path_for(id).display().to_string()),
        ("Environment", paths.environment_path_for(id).display().to_string()),
        ("Ports", paths.port_description_path_for(id).display().to_string()),
    ];

    if let Some(fingerprint) = fingerprint {
        rows.extend([
            ("Key name", fingerprint.to_short_name()),
            (
                "Git read access",
                paths
                    .git_access_path_for(id, fingerprint, GitAccess::Read)
                    .display()
                    .to_string(),
            ),
            (
                "Git write access",
                paths
                    .git_access_path_for(id, fingerprint, GitAccess::Write)
                    .display()
                    .to_string(),
            ),
            (
                "SSH access",
                paths.ssh_access_path_for(id, fingerprint).display().to_string(),
            ),
            (
                "Public key",
                paths.public_key_path_for(fingerprint).display().to_string(),
            ),
        ]);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_without_fingerprint() {
        let paths = GearPaths::new("/var/lib/gears");
        let id = Identifier::new("abcd1234").unwrap();

        let rows = describe(&paths, &id, None);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], ("Unit", "gear-abcd1234.service".to_string()));
        assert_eq!(rows[1], ("Job unit", "job-abcd1234.service".to_string()));
        assert_eq!(
            rows[3],
            ("Repository", "/var/lib/gears/git/abcd1234".to_string())
        );
    }

    #[test]
    fn test_describe_with_fingerprint() {
        let paths = GearPaths::new("/var/lib/gears");
        let id = Identifier::new("abcd1234").unwrap();
        let fingerprint = Fingerprint::from_hex("01b0b5").unwrap();

        let rows = describe(&paths, &id, Some(&fingerprint));
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[6], ("Key name", "AbC1".to_string()));
        assert!(rows[7].1.starts_with("/var/lib/gears/access/git/"));
        assert_ne!(rows[7].1, rows[8].1);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Job Context
//!
//! Collaborators shared by every job on the host. Built once at process
//! start and handed to jobs behind an `Arc`.

use crate::domain::node_config::{JobsConfig, NodeConfigManifest, RepositoryConfig};
use crate::domain::paths::GearPaths;
use crate::domain::systemd::{SystemdConnection, SystemdConnector, UnitLogSource};
use crate::infrastructure::systemd::{JournalLogSource, SystemctlConnection, SystemctlConnector};
use std::sync::Arc;

pub struct JobContext {
    pub paths: GearPaths,
    pub repository: RepositoryConfig,
    pub jobs: JobsConfig,
    /// Process-wide connection used to start units. Never used for watches.
    pub systemd: Arc<dyn SystemdConnection>,
    /// Source of the private, per-job connections used for watches.
    pub connector: Arc<dyn SystemdConnector>,
    pub logs: Arc<dyn UnitLogSource>,
}

impl JobContext {
    /// Wire the systemctl/journalctl backed collaborators from configuration.
    pub fn from_config(config: &NodeConfigManifest) -> Self {
        let spec = &config.spec;
        Self {
            paths: spec.storage.paths(),
            repository: spec.repository.clone(),
            jobs: spec.jobs.clone(),
            systemd: Arc::new(SystemctlConnection::new(spec.systemd.clone())),
            connector: Arc::new(SystemctlConnector::new(spec.systemd.clone())),
            logs: Arc::new(JournalLogSource::new(spec.systemd.clone())),
        }
    }
}

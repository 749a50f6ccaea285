// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Unit Lifecycle Capability
//!
//! What jobs need from the systemd manager: start transient units, watch
//! unit state, follow unit output. Implementations live in the
//! infrastructure layer; jobs only see these traits.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** systemd contracts consumed by the job engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Status string returned by a start whose job completed successfully.
pub const JOB_RESULT_DONE: &str = "done";

/// Sub-state of a unit whose main process is still alive.
pub const SUB_STATE_RUNNING: &str = "running";

#[derive(Debug, Error)]
pub enum SystemdError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Unexpected output from {command}: {reason}")]
    Parse { command: String, reason: String },

    #[error("Job mode '{0}' is not supported by this connection")]
    UnsupportedJobMode(JobMode),

    #[error("Connection is not subscribed")]
    NotSubscribed,
}

/// How the manager treats a start that conflicts with queued jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    Fail,
    Replace,
    ReplaceIrreversibly,
    Isolate,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Fail => "fail",
            JobMode::Replace => "replace",
            JobMode::ReplaceIrreversibly => "replace-irreversibly",
            JobMode::Isolate => "isolate",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties of a unit that exists only for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransientUnitProperties {
    pub exec_start: Vec<String>,
    pub description: String,
    pub remain_after_exit: bool,
    pub slice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

impl UnitStatus {
    pub fn is_running(&self) -> bool {
        self.sub_state == SUB_STATE_RUNNING
    }
}

/// One batch of unit changes. `None` means the unit is no longer listed.
pub type UnitChanges = HashMap<String, Option<UnitStatus>>;

pub type ChangePredicate = Arc<dyn Fn(&UnitStatus, &UnitStatus) -> bool + Send + Sync>;
pub type UnitSelector = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Parameters of a unit watch.
#[derive(Clone)]
pub struct WatchOptions {
    /// Time between two looks at the manager's unit list.
    pub interval: Duration,
    /// Capacity of the change and error channels.
    pub buffer: usize,
    /// Decides whether a unit seen twice has changed.
    pub is_changed: ChangePredicate,
    /// Units for which this returns false are ignored.
    pub select_unit: UnitSelector,
}

impl WatchOptions {
    /// Report every observation of the single unit `unit_name`.
    pub fn single_unit(unit_name: impl Into<String>, interval: Duration, buffer: usize) -> Self {
        let unit_name = unit_name.into();
        Self {
            interval,
            buffer,
            is_changed: Arc::new(|_, _| true),
            select_unit: Arc::new(move |name| name == unit_name),
        }
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("interval", &self.interval)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

/// Receiving ends of a unit watch. Dropping it ends the watch.
pub struct UnitSubscription {
    pub changes: mpsc::Receiver<UnitChanges>,
    pub errors: mpsc::Receiver<SystemdError>,
}

/// Live output of a unit.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// A connection to the systemd manager.
///
/// Subscriptions are scoped to the connection they were opened on, so a job
/// that watches units uses a connection of its own.
#[async_trait]
pub trait SystemdConnection: Send + Sync {
    /// Start a unit that has no unit file. Returns the job result string,
    /// [`JOB_RESULT_DONE`] on success.
    async fn start_transient_unit(
        &self,
        name: &str,
        mode: JobMode,
        properties: &TransientUnitProperties,
    ) -> Result<String, SystemdError>;

    async fn list_units(&self) -> Result<Vec<UnitStatus>, SystemdError>;

    async fn subscribe(&self) -> Result<(), SystemdError>;

    async fn unsubscribe(&self) -> Result<(), SystemdError>;

    /// Watch unit state on this connection. Requires [`subscribe`] first.
    ///
    /// [`subscribe`]: SystemdConnection::subscribe
    fn subscribe_units_custom(&self, options: WatchOptions) -> UnitSubscription;

    async fn disable_unit_files(
        &self,
        files: &[PathBuf],
        runtime: bool,
    ) -> Result<(), SystemdError>;

    async fn reload(&self) -> Result<(), SystemdError>;
}

/// Opens private connections for jobs that need their own subscription.
#[async_trait]
pub trait SystemdConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SystemdConnection>, SystemdError>;
}

#[async_trait]
pub trait UnitLogSource: Send + Sync {
    /// Follow output of `unit` from now on. Dropping the stream stops it.
    async fn logs_for_unit(&self, unit: &str) -> Result<LogStream, SystemdError>;
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Job Contracts
//!
//! A job is one asynchronous administrative operation on a single gear. It
//! runs exactly once on its own worker and reports through a [`JobResponse`]
//! sink owned by the dispatch layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Job trait, response protocol and structured job errors

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::AsyncWrite;
use uuid::Uuid;

/// Byte sink handed to a job once its request has been accepted.
pub type ResponseWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status reported together with a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ok,
    Accepted,
}

/// Coarse classification the dispatch layer maps onto its own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    ResourceConflict,
    ResourceCreationFailure,
    InfrastructureUnavailable,
    ExecutionStartFailure,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::ResourceConflict => "resource_conflict",
            JobErrorKind::ResourceCreationFailure => "resource_creation_failure",
            JobErrorKind::InfrastructureUnavailable => "infrastructure_unavailable",
            JobErrorKind::ExecutionStartFailure => "execution_start_failure",
        }
    }
}

/// Structured failures a job may report before it has accepted the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("{resource} already exists")]
    ResourceConflict { resource: String },

    #[error("unable to create {resource}: {reason}")]
    ResourceCreationFailure { resource: String, reason: String },

    #[error("systemd is unavailable: {reason}")]
    InfrastructureUnavailable { reason: String },

    #[error("unit {unit} failed to start: {reason}")]
    ExecutionStartFailure { unit: String, reason: String },
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            JobError::ResourceConflict { .. } => JobErrorKind::ResourceConflict,
            JobError::ResourceCreationFailure { .. } => JobErrorKind::ResourceCreationFailure,
            JobError::InfrastructureUnavailable { .. } => JobErrorKind::InfrastructureUnavailable,
            JobError::ExecutionStartFailure { .. } => JobErrorKind::ExecutionStartFailure,
        }
    }
}

/// Reporting side of a job, implemented by the dispatch layer.
///
/// Exactly one terminal call is expected per job. Implementations must
/// tolerate a second terminal call by ignoring it (and logging), never by
/// panicking.
pub trait JobResponse: Send {
    /// Report a structured failure. Nothing else may be reported afterwards.
    fn failure(&mut self, error: JobError);

    /// Accept the request and obtain a writer for progress output.
    ///
    /// From the caller's point of view the job has succeeded once this
    /// returns, whatever is written to the stream later.
    fn success_with_write(&mut self, status: JobStatus, streaming: bool) -> ResponseWriter;
}

#[async_trait]
pub trait Job: Send {
    /// Short, stable name of the operation, used in logs and metrics.
    fn kind(&self) -> &'static str;

    fn id(&self) -> JobId;

    /// Run the job to completion. Called exactly once.
    async fn execute(self: Box<Self>);
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Create Repository Job
//!
//! Provisions a gear's backing repository by running a container in a
//! transient unit and streaming its output back to the caller.
//!
//! Steps, in order:
//! 1. exclusively create the repository directory and hand it to the owner
//! 2. open a private connection and watch the job unit
//! 3. follow the job unit's output
//! 4. start the transient unit on the shared connection
//! 5. accept the request
//! 6. relay output while waiting for the unit to leave "running", for a
//!    subscription error (reported, keeps waiting) or for the deadline
//!
//! The watch is registered before the start so that a unit finishing
//! faster than the watch setup is still observed. Failures before step 5
//! are reported as [`JobError`]; after it, problems only appear as text in
//! the accepted stream. A unit that stopped is not distinguished from one
//! that failed: both end the wait with the same completion line.
//!
//! A caller that stops reading does not keep the job alive: the relay gives
//! way to its stop signal mid-write and other writes to the response are
//! bounded by [`RESPONSE_WRITE_TIMEOUT`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Repository provisioning job

use crate::application::context::JobContext;
use crate::domain::identifier::Identifier;
use crate::domain::job::{Job, JobError, JobId, JobResponse, JobStatus, ResponseWriter};
use crate::domain::paths::DIRECTORY_MODE;
use crate::domain::systemd::{
    JobMode, LogStream, SystemdConnection, TransientUnitProperties, UnitSubscription,
    WatchOptions, JOB_RESULT_DONE,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const JOB_KIND: &str = "create_repository";

/// Response writer shared between the log relay and the wait loop.
type SharedWriter = Arc<Mutex<ResponseWriter>>;

/// Longest a single write or flush of the response may stay pending.
pub(crate) const RESPONSE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CreateRepositoryRequest {
    pub repository_id: Identifier,
    pub user_id: String,
    pub image: String,
    pub clone_url: String,
}

/// How the wait phase ended. Never reported to the caller as a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The unit left "running"; `None` when it is no longer listed at all.
    UnitStopped { sub_state: Option<String> },
    TimedOut,
}

pub struct CreateRepositoryJob {
    id: JobId,
    request: CreateRepositoryRequest,
    response: Box<dyn JobResponse>,
    context: Arc<JobContext>,
}

impl CreateRepositoryJob {
    pub fn new(
        request: CreateRepositoryRequest,
        response: Box<dyn JobResponse>,
        context: Arc<JobContext>,
    ) -> Self {
        Self {
            id: JobId::new(),
            request,
            response,
            context,
        }
    }

    async fn run(self) {
        let CreateRepositoryJob {
            request,
            mut response,
            context,
            ..
        } = self;
        let steps = Steps {
            request: &request,
            context: &context,
        };
        let fail = |response: &mut Box<dyn JobResponse>, error: JobError| {
            warn!(
                repository_id = %request.repository_id,
                kind = error.kind().as_str(),
                "Create repository failed: {}",
                error
            );
            metrics::counter!(
                "gears_jobs_total",
                "kind" => JOB_KIND,
                "outcome" => error.kind().as_str()
            )
            .increment(1);
            response.failure(error);
        };

        let repository_path = context.paths.repository_path_for(&request.repository_id);
        let unit_name = request.repository_id.job_unit_name();

        if let Err(e) = steps.provision_directory(&repository_path) {
            fail(&mut response, e);
            return;
        }

        let connection = match steps.open_private_connection().await {
            Ok(connection) => connection,
            Err(e) => {
                fail(&mut response, e);
                return;
            }
        };

        let mut subscription = connection.subscribe_units_custom(WatchOptions::single_unit(
            unit_name.clone(),
            context.jobs.poll_interval(),
            context.jobs.poll_batch_size,
        ));

        let logs = steps.open_logs(&unit_name).await;

        // Only now, with the watch and the log follower in place
        if let Err(e) = steps.start_unit(&unit_name, &repository_path).await {
            fail(&mut response, e);
            close_connection(connection.as_ref()).await;
            return;
        }
        info!(
            unit = %unit_name,
            repository_id = %request.repository_id,
            user_id = %request.user_id,
            "Repository job unit started"
        );

        let writer: SharedWriter = Arc::new(Mutex::new(
            response.success_with_write(JobStatus::Accepted, true),
        ));
        metrics::counter!("gears_jobs_total", "kind" => JOB_KIND, "outcome" => "accepted")
            .increment(1);

        let stop_relay = CancellationToken::new();
        let relay = tokio::spawn(relay_logs(logs, writer.clone(), stop_relay.clone()));

        let outcome = wait_for_unit(
            &mut subscription,
            &unit_name,
            context.jobs.wait_timeout(),
            &writer,
        )
        .await;
        let outcome_label = match &outcome {
            WaitOutcome::UnitStopped { .. } => "unit_stopped",
            WaitOutcome::TimedOut => "timed_out",
        };
        metrics::counter!("gears_job_waits_total", "kind" => JOB_KIND, "outcome" => outcome_label)
            .increment(1);

        stop_relay.cancel();
        match relay.await {
            Ok(copied) => debug!(bytes = copied, "Log relay finished"),
            Err(e) => warn!("Log relay task failed: {}", e),
        }
        flush_response(&writer).await;

        drop(subscription);
        close_connection(connection.as_ref()).await;
        info!(unit = %unit_name, ?outcome, "Repository job finished");
    }
}

/// Borrowed view of a job used by its individual steps.
struct Steps<'a> {
    request: &'a CreateRepositoryRequest,
    context: &'a JobContext,
}

impl Steps<'_> {
    fn provision_directory(&self, repository_path: &Path) -> Result<(), JobError> {
        let resource = format!("repository {}", self.request.repository_id);

        self.context
            .paths
            .provision_parent(repository_path)
            .map_err(|e| JobError::ResourceCreationFailure {
                resource: resource.clone(),
                reason: e.to_string(),
            })?;

        match std::fs::DirBuilder::new().mode(DIRECTORY_MODE).create(repository_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(JobError::ResourceConflict { resource });
            }
            Err(e) => {
                return Err(JobError::ResourceCreationFailure {
                    resource,
                    reason: e.to_string(),
                });
            }
        }

        let owner = &self.context.repository;
        if let Err(e) =
            std::os::unix::fs::chown(repository_path, Some(owner.owner_uid), Some(owner.owner_gid))
        {
            warn!(
                path = %repository_path.display(),
                uid = owner.owner_uid,
                gid = owner.owner_gid,
                "Unable to set owner for repository path: {}",
                e
            );
        }
        Ok(())
    }

    async fn open_private_connection(&self) -> Result<Arc<dyn SystemdConnection>, JobError> {
        let connection = self.context.connector.connect().await.map_err(|e| {
            JobError::InfrastructureUnavailable {
                reason: e.to_string(),
            }
        })?;
        connection
            .subscribe()
            .await
            .map_err(|e| JobError::InfrastructureUnavailable {
                reason: e.to_string(),
            })?;
        Ok(connection)
    }

    async fn open_logs(&self, unit_name: &str) -> LogStream {
        match self.context.logs.logs_for_unit(unit_name).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(unit = unit_name, "Unable to fetch unit logs: {}", e);
                Box::new(tokio::io::empty())
            }
        }
    }

    fn unit_properties(&self, repository_path: &Path) -> TransientUnitProperties {
        TransientUnitProperties {
            exec_start: self.context.repository.container_argv(
                repository_path,
                &self.request.image,
                &self.request.clone_url,
            ),
            description: format!("Create a repository ({})", repository_path.display()),
            remain_after_exit: true,
            slice: Some(self.context.repository.slice.clone()),
        }
    }

    async fn start_unit(&self, unit_name: &str, repository_path: &Path) -> Result<(), JobError> {
        let properties = self.unit_properties(repository_path);
        match self
            .context
            .systemd
            .start_transient_unit(unit_name, JobMode::Fail, &properties)
            .await
        {
            Ok(status) if status == JOB_RESULT_DONE => Ok(()),
            Ok(status) => Err(JobError::ExecutionStartFailure {
                unit: unit_name.to_string(),
                reason: format!("start job finished with '{}'", status),
            }),
            Err(e) => Err(JobError::ExecutionStartFailure {
                unit: unit_name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Job for CreateRepositoryJob {
    fn kind(&self) -> &'static str {
        JOB_KIND
    }

    fn id(&self) -> JobId {
        self.id
    }

    async fn execute(self: Box<Self>) {
        (*self).run().await
    }
}

async fn close_connection(connection: &dyn SystemdConnection) {
    if let Err(e) = connection.unsubscribe().await {
        warn!("Unable to unsubscribe job connection: {}", e);
    }
}

/// Write `line` unless the reader leaves it pending for [`RESPONSE_WRITE_TIMEOUT`].
async fn write_line(writer: &SharedWriter, line: &str) {
    let written = tokio::time::timeout(RESPONSE_WRITE_TIMEOUT, async {
        let mut writer = writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    })
    .await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Unable to write to job response: {}", e),
        Err(_) => warn!(line, "Job response is not being read, line dropped"),
    }
}

async fn flush_response(writer: &SharedWriter) {
    let flushed = tokio::time::timeout(RESPONSE_WRITE_TIMEOUT, async {
        writer.lock().await.flush().await
    })
    .await;
    match flushed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Unable to flush job response: {}", e),
        Err(_) => warn!("Job response is not being read, flush abandoned"),
    }
}

/// Copy unit output into the response until the output ends or `stop` fires.
///
/// Every await, including a write the reader is not draining, gives way to `stop`.
async fn relay_logs(mut logs: LogStream, writer: SharedWriter, stop: CancellationToken) -> u64 {
    let mut buf = vec![0u8; 8 * 1024];
    let mut copied = 0u64;
    loop {
        let n = tokio::select! {
            _ = stop.cancelled() => break,
            read = logs.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Unit log stream failed: {}", e);
                    break;
                }
            },
        };
        let mut out = tokio::select! {
            _ = stop.cancelled() => break,
            out = writer.lock() => out,
        };
        let written = tokio::select! {
            _ = stop.cancelled() => break,
            written = out.write_all(&buf[..n]) => written,
        };
        if let Err(e) = written {
            debug!("Unable to relay unit output: {}", e);
            break;
        }
        copied += n as u64;
    }
    copied
}

/// Race unit changes, subscription errors and a deadline fixed at entry.
///
/// The first change for `unit_name` that is not "running" ends the wait,
/// as does the deadline. Subscription errors are written to the response
/// and the wait goes on.
pub(crate) async fn wait_for_unit(
    subscription: &mut UnitSubscription,
    unit_name: &str,
    timeout: Duration,
    writer: &SharedWriter,
) -> WaitOutcome {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            Some(changes) = subscription.changes.recv() => {
                let sub_state = match changes.get(unit_name) {
                    None => continue,
                    Some(Some(status)) if status.is_running() => continue,
                    Some(Some(status)) => Some(status.sub_state.clone()),
                    Some(None) => None,
                };
                let shown = sub_state.as_deref().unwrap_or("unit removed");
                write_line(writer, &format!("Repository completed ({})", shown)).await;
                return WaitOutcome::UnitStopped { sub_state };
            }
            Some(error) = subscription.errors.recv() => {
                write_line(writer, &format!("Error {}", error)).await;
            }
            _ = &mut deadline => {
                warn!(
                    unit = unit_name,
                    timeout_secs = timeout.as_secs_f64(),
                    "Timed out waiting for unit"
                );
                return WaitOutcome::TimedOut;
            }
        }
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::job::Job;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, Instrument};

/// Run `job` on a task of its own.
///
/// The job's logs carry its id and kind. The handle resolves once the job
/// has returned; there is no way to cancel a job through it.
pub fn spawn_job(job: Box<dyn Job>) -> JoinHandle<()> {
    let span = info_span!("job", job_id = %job.id(), kind = job.kind());
    tokio::spawn(
        async move {
            debug!("Job started");
            job.execute().await;
            debug!("Job finished");
        }
        .instrument(span),
    )
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Writer-backed job response
//!
//! [`JobResponse`] over any async writer. Used by the local CLI and by tests;
//! the terminal outcome is recorded in a shared [`OutcomeHandle`] the caller
//! keeps after handing the response to the job.

use crate::domain::job::{JobError, JobResponse, JobStatus, ResponseWriter};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Failed(JobError),
    Accepted { status: JobStatus, streaming: bool },
}

#[derive(Debug, Clone, Default)]
pub struct OutcomeHandle(Arc<Mutex<Option<JobOutcome>>>);

impl OutcomeHandle {
    /// Terminal outcome, if the job reported one.
    pub fn get(&self) -> Option<JobOutcome> {
        self.0.lock().clone()
    }
}

pub struct WriterJobResponse {
    writer: Option<ResponseWriter>,
    outcome: OutcomeHandle,
}

impl WriterJobResponse {
    pub fn new(writer: ResponseWriter) -> (Self, OutcomeHandle) {
        let outcome = OutcomeHandle::default();
        (
            Self {
                writer: Some(writer),
                outcome: outcome.clone(),
            },
            outcome,
        )
    }

    /// Record `outcome` unless one is already present.
    fn settle(&self, outcome: JobOutcome) -> bool {
        let mut slot = self.outcome.0.lock();
        if let Some(existing) = slot.as_ref() {
            warn!(?existing, ignored = ?outcome, "Job reported a second terminal outcome");
            return false;
        }
        *slot = Some(outcome);
        true
    }
}

impl JobResponse for WriterJobResponse {
    fn failure(&mut self, error: JobError) {
        if self.settle(JobOutcome::Failed(error)) {
            // nothing will ever be written
            self.writer = None;
        }
    }

    fn success_with_write(&mut self, status: JobStatus, streaming: bool) -> ResponseWriter {
        if !self.settle(JobOutcome::Accepted { status, streaming }) {
            return Box::new(tokio::io::sink());
        }
        match self.writer.take() {
            Some(writer) => writer,
            None => Box::new(tokio::io::sink()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_accept_hands_out_writer() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (mut response, outcome) = WriterJobResponse::new(Box::new(client));

        let mut writer = response.success_with_write(JobStatus::Accepted, true);
        writer.write_all(b"cloning\n").await.unwrap();
        drop(writer);
        drop(response);

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "cloning\n");
        assert_eq!(
            outcome.get(),
            Some(JobOutcome::Accepted {
                status: JobStatus::Accepted,
                streaming: true
            })
        );
    }

    #[tokio::test]
    async fn test_second_terminal_call_is_ignored() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (mut response, outcome) = WriterJobResponse::new(Box::new(client));

        response.failure(JobError::ResourceConflict {
            resource: "repository".to_string(),
        });
        let mut late = response.success_with_write(JobStatus::Accepted, true);
        late.write_all(b"should vanish").await.unwrap();
        response.failure(JobError::InfrastructureUnavailable {
            reason: "late".to_string(),
        });
        drop(late);
        drop(response);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
        assert!(matches!(
            outcome.get(),
            Some(JobOutcome::Failed(JobError::ResourceConflict { .. }))
        ));
    }
}

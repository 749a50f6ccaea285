// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Unit output from the journal
//!
//! Follows `journalctl` for one unit. The child process lives as long as the
//! returned stream and is killed when the stream is dropped.

use crate::domain::node_config::SystemdConfig;
use crate::domain::systemd::{LogStream, SystemdError, UnitLogSource};
use async_trait::async_trait;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

pub struct JournalLogSource {
    config: SystemdConfig,
}

impl JournalLogSource {
    pub fn new(config: SystemdConfig) -> Self {
        Self { config }
    }

    fn args(&self, unit: &str) -> Vec<String> {
        let unit_flag = if self.config.user_mode {
            "--user-unit"
        } else {
            "--unit"
        };
        vec![
            "--since=now".to_string(),
            "--follow".to_string(),
            "--output=cat".to_string(),
            format!("{}={}", unit_flag, unit),
        ]
    }
}

#[async_trait]
impl UnitLogSource for JournalLogSource {
    async fn logs_for_unit(&self, unit: &str) -> Result<LogStream, SystemdError> {
        let mut child = Command::new(&self.config.journalctl_path)
            .args(self.args(unit))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SystemdError::Spawn {
                command: "journalctl".to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SystemdError::Parse {
            command: "journalctl".to_string(),
            reason: "stdout was not captured".to_string(),
        })?;

        debug!(unit, "Following unit journal");
        Ok(Box::new(JournalStream { _child: child, stdout }))
    }
}

struct JournalStream {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for JournalStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! systemctl-backed connection
//!
//! Talks to the systemd manager through its command line tools, the same way
//! service installation does: `systemd-run` for transient units and
//! `systemctl` for everything else. Unit watches poll `list-units`.

use crate::domain::node_config::SystemdConfig;
use crate::domain::systemd::{
    JobMode, SystemdConnection, SystemdConnector, SystemdError, TransientUnitProperties,
    UnitStatus, UnitSubscription, WatchOptions, JOB_RESULT_DONE,
};
use crate::infrastructure::systemd::subscription::spawn_unit_watch;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct SystemctlConnection {
    config: Arc<SystemdConfig>,
    /// Present while subscribed; cancelling it ends every watch of this connection.
    subscription: Arc<Mutex<Option<CancellationToken>>>,
}

impl SystemctlConnection {
    pub fn new(config: SystemdConfig) -> Self {
        Self {
            config: Arc::new(config),
            subscription: Arc::new(Mutex::new(None)),
        }
    }

    fn command(&self, program: &str) -> Command {
        let mut command = Command::new(program);
        if self.config.user_mode {
            command.arg("--user");
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, mut command: Command, label: &str) -> Result<String, SystemdError> {
        debug!(command = label, "Running systemd command");
        let output = command.output().await.map_err(|source| SystemdError::Spawn {
            command: label.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(SystemdError::CommandFailed {
                command: label.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Check that the manager answers.
    pub async fn ping(&self) -> Result<(), SystemdError> {
        let mut command = self.command(&self.config.systemctl_path);
        command.args(["show", "--property=Version", "--value"]);
        let version = self.run(command, "systemctl show").await?;
        debug!(version = version.trim(), "systemd manager reachable");
        Ok(())
    }
}

/// `systemd-run` arguments (after the scope flag) for a transient unit.
pub(crate) fn transient_unit_args(name: &str, properties: &TransientUnitProperties) -> Vec<String> {
    let mut args = vec![
        format!("--unit={}", name),
        format!("--description={}", properties.description),
    ];
    if properties.remain_after_exit {
        args.push("--remain-after-exit".to_string());
    }
    if let Some(slice) = &properties.slice {
        args.push(format!("--slice={}", slice));
    }
    args.push("--".to_string());
    args.extend(properties.exec_start.iter().cloned());
    args
}

/// `systemctl` arguments (after the scope flag) disabling unit files.
pub(crate) fn disable_unit_args(files: &[PathBuf], runtime: bool) -> Vec<OsString> {
    let mut args = vec![OsString::from("disable")];
    if runtime {
        args.push(OsString::from("--runtime"));
    }
    args.push(OsString::from("--"));
    args.extend(files.iter().map(|file| file.as_os_str().to_owned()));
    args
}

#[derive(Debug, Deserialize)]
struct ListedUnit {
    unit: String,
    load: String,
    active: String,
    sub: String,
    #[serde(default)]
    description: String,
}

pub(crate) fn parse_list_units(json: &str) -> Result<Vec<UnitStatus>, SystemdError> {
    let listed: Vec<ListedUnit> = serde_json::from_str(json).map_err(|e| SystemdError::Parse {
        command: "systemctl list-units".to_string(),
        reason: e.to_string(),
    })?;

    Ok(listed
        .into_iter()
        .map(|u| UnitStatus {
            name: u.unit,
            description: u.description,
            load_state: u.load,
            active_state: u.active,
            sub_state: u.sub,
        })
        .collect())
}

#[async_trait]
impl SystemdConnection for SystemctlConnection {
    async fn start_transient_unit(
        &self,
        name: &str,
        mode: JobMode,
        properties: &TransientUnitProperties,
    ) -> Result<String, SystemdError> {
        // systemd-run always queues its start job in "fail" mode
        if mode != JobMode::Fail {
            return Err(SystemdError::UnsupportedJobMode(mode));
        }
        if properties.exec_start.is_empty() {
            return Err(SystemdError::Parse {
                command: "systemd-run".to_string(),
                reason: "transient unit has no command".to_string(),
            });
        }

        let mut command = self.command(&self.config.systemd_run_path);
        command.args(transient_unit_args(name, properties));
        // Without --no-block systemd-run returns once the start job finished
        self.run(command, "systemd-run").await?;

        info!(unit = name, "Started transient unit");
        Ok(JOB_RESULT_DONE.to_string())
    }

    async fn list_units(&self) -> Result<Vec<UnitStatus>, SystemdError> {
        let mut command = self.command(&self.config.systemctl_path);
        command.args(["list-units", "--all", "--no-pager", "--output=json"]);
        let stdout = self.run(command, "systemctl list-units").await?;
        parse_list_units(&stdout)
    }

    async fn subscribe(&self) -> Result<(), SystemdError> {
        self.ping().await?;
        let mut subscription = self.subscription.lock();
        if subscription.is_none() {
            *subscription = Some(CancellationToken::new());
        }
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), SystemdError> {
        if let Some(token) = self.subscription.lock().take() {
            token.cancel();
        }
        Ok(())
    }

    fn subscribe_units_custom(&self, options: WatchOptions) -> UnitSubscription {
        let token = self.subscription.lock().as_ref().map(CancellationToken::child_token);
        match token {
            Some(token) => spawn_unit_watch(Arc::new(self.clone()), options, token),
            None => {
                let (_, changes) = mpsc::channel(1);
                let (errors_tx, errors) = mpsc::channel(1);
                let _ = errors_tx.try_send(SystemdError::NotSubscribed);
                UnitSubscription { changes, errors }
            }
        }
    }

    async fn disable_unit_files(
        &self,
        files: &[PathBuf],
        runtime: bool,
    ) -> Result<(), SystemdError> {
        if files.is_empty() {
            return Ok(());
        }
        let mut command = self.command(&self.config.systemctl_path);
        command.args(disable_unit_args(files, runtime));
        self.run(command, "systemctl disable").await?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), SystemdError> {
        let mut command = self.command(&self.config.systemctl_path);
        command.arg("daemon-reload");
        self.run(command, "systemctl daemon-reload").await?;
        Ok(())
    }
}

/// Hands out a fresh [`SystemctlConnection`] per caller.
pub struct SystemctlConnector {
    config: SystemdConfig,
}

impl SystemctlConnector {
    pub fn new(config: SystemdConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SystemdConnector for SystemctlConnector {
    async fn connect(&self) -> Result<Arc<dyn SystemdConnection>, SystemdError> {
        let connection = SystemctlConnection::new(self.config.clone());
        connection.ping().await?;
        Ok(Arc::new(connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_unit_args() {
        let properties = TransientUnitProperties {
            exec_start: vec!["/usr/bin/docker".to_string(), "run".to_string()],
            description: "Create a repository (/var/lib/gears/git/beef)".to_string(),
            remain_after_exit: true,
            slice: Some("gear.slice".to_string()),
        };
        assert_eq!(
            transient_unit_args("job-beef.service", &properties),
            vec![
                "--unit=job-beef.service",
                "--description=Create a repository (/var/lib/gears/git/beef)",
                "--remain-after-exit",
                "--slice=gear.slice",
                "--",
                "/usr/bin/docker",
                "run",
            ]
        );
    }

    #[test]
    fn test_disable_unit_args() {
        let files = [
            PathBuf::from("/var/lib/gears/units/gear-beef.service"),
            PathBuf::from("/var/lib/gears/units/gear-cafe.service"),
        ];
        assert_eq!(
            disable_unit_args(&files, false),
            vec![
                "disable",
                "--",
                "/var/lib/gears/units/gear-beef.service",
                "/var/lib/gears/units/gear-cafe.service",
            ]
        );
        assert_eq!(
            disable_unit_args(&files[..1], true),
            vec!["disable", "--runtime", "--", "/var/lib/gears/units/gear-beef.service"]
        );
    }

    /// Fake systemctl that appends its arguments, one line per call, to `log`.
    fn recording_systemctl(dir: &std::path::Path, log: &std::path::Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("systemctl");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s\\n' \"$*\" >> {}\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    #[tokio::test]
    async fn test_disable_and_reload_invoke_systemctl() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls");
        let connection = SystemctlConnection::new(SystemdConfig {
            systemctl_path: recording_systemctl(dir.path(), &log),
            user_mode: true,
            ..SystemdConfig::default()
        });

        connection
            .disable_unit_files(&[PathBuf::from("/units/gear-beef.service")], true)
            .await
            .unwrap();
        connection.disable_unit_files(&[], false).await.unwrap();
        connection.reload().await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            calls,
            "--user disable --runtime -- /units/gear-beef.service\n--user daemon-reload\n"
        );
    }

    #[test]
    fn test_parse_list_units() {
        let json = r#"[
            {"unit":"job-beef.service","load":"loaded","active":"active",
             "sub":"exited","description":"Create a repository"},
            {"unit":"gear.slice","load":"loaded","active":"active",
             "sub":"active","description":"gear.slice"}
        ]"#;
        let units = parse_list_units(json).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "job-beef.service");
        assert_eq!(units[0].sub_state, "exited");
        assert_eq!(units[1].active_state, "active");
    }

    #[test]
    fn test_parse_list_units_rejects_garbage() {
        assert!(matches!(
            parse_list_units("UNIT LOAD ACTIVE SUB"),
            Err(SystemdError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_watch_without_subscribe_reports_error() {
        let connection = SystemctlConnection::new(SystemdConfig::default());
        let options = WatchOptions::single_unit(
            "job-beef.service",
            std::time::Duration::from_millis(10),
            2,
        );
        let mut subscription = connection.subscribe_units_custom(options);
        assert!(matches!(
            subscription.errors.recv().await,
            Some(SystemdError::NotSubscribed)
        ));
        assert!(subscription.changes.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let connection = SystemctlConnection::new(SystemdConfig {
            systemctl_path: "/nonexistent/systemctl".to_string(),
            ..SystemdConfig::default()
        });
        assert!(matches!(connection.ping().await, Err(SystemdError::Spawn { .. })));
    }
}

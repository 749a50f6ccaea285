// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Polling unit watch
//!
//! Turns periodic `list_units` snapshots into change batches: every interval
//! the selected units are compared with the previous snapshot, new or
//! changed units are reported with their status and units that disappeared
//! are reported as `None`. Listing errors go to the error channel.

use crate::domain::systemd::{
    ChangePredicate, SystemdConnection, UnitChanges, UnitStatus, UnitSubscription, WatchOptions,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Start a watch task over `connection`.
///
/// The task ends when the subscription is dropped or `shutdown` fires.
pub fn spawn_unit_watch(
    connection: Arc<dyn SystemdConnection>,
    options: WatchOptions,
    shutdown: CancellationToken,
) -> UnitSubscription {
    let capacity = options.buffer.max(1);
    let (changes_tx, changes) = mpsc::channel(capacity);
    let (errors_tx, errors) = mpsc::channel(capacity);

    tokio::spawn(run_watch(connection, options, shutdown, changes_tx, errors_tx));

    UnitSubscription { changes, errors }
}

async fn run_watch(
    connection: Arc<dyn SystemdConnection>,
    options: WatchOptions,
    shutdown: CancellationToken,
    changes_tx: mpsc::Sender<UnitChanges>,
    errors_tx: mpsc::Sender<crate::domain::systemd::SystemdError>,
) {
    let mut previous: HashMap<String, UnitStatus> = HashMap::new();
    let mut tick = tokio::time::interval(options.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = changes_tx.closed() => break,
            _ = tick.tick() => {}
        }

        match connection.list_units().await {
            Ok(units) => {
                let current = units
                    .into_iter()
                    .filter(|unit| (options.select_unit)(&unit.name))
                    .map(|unit| (unit.name.clone(), unit))
                    .collect();
                let batch = diff_units(&mut previous, current, &options.is_changed);
                if batch.is_empty() {
                    continue;
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = changes_tx.send(batch) => if sent.is_err() { break },
                }
            }
            Err(e) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = errors_tx.send(e) => if sent.is_err() { break },
                }
            }
        }
    }

    debug!("Unit watch stopped");
}

/// Compare `current` against `previous`, then make it the new `previous`.
pub(crate) fn diff_units(
    previous: &mut HashMap<String, UnitStatus>,
    current: HashMap<String, UnitStatus>,
    is_changed: &ChangePredicate,
) -> UnitChanges {
    let mut changed = UnitChanges::new();

    for (name, status) in &current {
        match previous.remove(name) {
            Some(old) if !is_changed(&old, status) => {}
            _ => {
                changed.insert(name.clone(), Some(status.clone()));
            }
        }
    }
    for name in previous.keys() {
        changed.insert(name.clone(), None);
    }

    *previous = current;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::systemd::{JobMode, SystemdError, TransientUnitProperties};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::time::Duration;

    fn status(name: &str, sub: &str) -> UnitStatus {
        UnitStatus {
            name: name.to_string(),
            description: String::new(),
            load_state: "loaded".to_string(),
            active_state: "active".to_string(),
            sub_state: sub.to_string(),
        }
    }

    fn snapshot(units: &[UnitStatus]) -> HashMap<String, UnitStatus> {
        units.iter().map(|u| (u.name.clone(), u.clone())).collect()
    }

    #[test]
    fn test_diff_reports_new_changed_and_removed() {
        let by_sub_state: ChangePredicate = Arc::new(|a, b| a.sub_state != b.sub_state);
        let mut previous = HashMap::new();

        let first = diff_units(
            &mut previous,
            snapshot(&[status("a.service", "running"), status("b.service", "running")]),
            &by_sub_state,
        );
        assert_eq!(first.len(), 2);

        let second = diff_units(
            &mut previous,
            snapshot(&[status("a.service", "running"), status("b.service", "exited")]),
            &by_sub_state,
        );
        assert_eq!(second.len(), 1);
        assert_eq!(second["b.service"].as_ref().unwrap().sub_state, "exited");

        let third = diff_units(
            &mut previous,
            snapshot(&[status("a.service", "running")]),
            &by_sub_state,
        );
        assert_eq!(third.len(), 1);
        assert_eq!(third["b.service"], None);
    }

    #[test]
    fn test_diff_always_changed_reports_every_observation() {
        let always: ChangePredicate = Arc::new(|_, _| true);
        let mut previous = HashMap::new();
        let unit = [status("job-beef.service", "running")];

        assert_eq!(diff_units(&mut previous, snapshot(&unit), &always).len(), 1);
        assert_eq!(diff_units(&mut previous, snapshot(&unit), &always).len(), 1);
    }

    struct ScriptedConnection {
        listings: Mutex<VecDeque<Result<Vec<UnitStatus>, SystemdError>>>,
    }

    #[async_trait]
    impl SystemdConnection for ScriptedConnection {
        async fn start_transient_unit(
            &self,
            _name: &str,
            _mode: JobMode,
            _properties: &TransientUnitProperties,
        ) -> Result<String, SystemdError> {
            Ok("done".to_string())
        }
        async fn list_units(&self) -> Result<Vec<UnitStatus>, SystemdError> {
            self.listings.lock().pop_front().unwrap_or_else(|| Ok(vec![]))
        }
        async fn subscribe(&self) -> Result<(), SystemdError> {
            Ok(())
        }
        async fn unsubscribe(&self) -> Result<(), SystemdError> {
            Ok(())
        }
        fn subscribe_units_custom(&self, _options: WatchOptions) -> UnitSubscription {
            unimplemented!("not used by the poller")
        }
        async fn disable_unit_files(
            &self,
            _files: &[PathBuf],
            _runtime: bool,
        ) -> Result<(), SystemdError> {
            Ok(())
        }
        async fn reload(&self) -> Result<(), SystemdError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_watch_filters_units_and_forwards_errors() {
        let connection = Arc::new(ScriptedConnection {
            listings: Mutex::new(VecDeque::from(vec![
                Ok(vec![status("other.service", "running")]),
                Err(SystemdError::Parse {
                    command: "systemctl list-units".to_string(),
                    reason: "truncated".to_string(),
                }),
                Ok(vec![
                    status("other.service", "running"),
                    status("job-beef.service", "exited"),
                ]),
            ])),
        });

        let options = WatchOptions::single_unit("job-beef.service", Duration::from_millis(5), 2);
        let mut subscription = spawn_unit_watch(connection, options, CancellationToken::new());

        let error = tokio::time::timeout(Duration::from_secs(5), subscription.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(error, SystemdError::Parse { .. }));

        let batch = tokio::time::timeout(Duration::from_secs(5), subscription.changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch["job-beef.service"].as_ref().unwrap().sub_state, "exited");
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let connection = Arc::new(ScriptedConnection {
            listings: Mutex::new(VecDeque::new()),
        });
        let shutdown = CancellationToken::new();
        let options = WatchOptions::single_unit("job-beef.service", Duration::from_millis(5), 2);
        let mut subscription = spawn_unit_watch(connection, options, shutdown.clone());

        shutdown.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(5), subscription.changes.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }
}

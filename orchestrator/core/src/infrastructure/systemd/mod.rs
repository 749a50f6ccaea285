// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod connection;
pub mod journal;
pub mod subscription;

pub use connection::{SystemctlConnection, SystemctlConnector};
pub use journal::JournalLogSource;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the gears CLI

pub mod config;
pub mod paths;
pub mod repository;

pub use self::config::ConfigCommand;
pub use self::paths::PathsArgs;
pub use self::repository::RepositoryCommand;

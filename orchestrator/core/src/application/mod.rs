// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod context;
pub mod create_repository;
pub mod worker;

pub use context::JobContext;
pub use create_repository::{CreateRepositoryJob, CreateRepositoryRequest, WaitOutcome};
pub use worker::spawn_job;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gears Orchestrator Core
//!
//! Gear identity and on-disk addressing, plus a job engine that provisions
//! repositories through transient systemd units.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain types, job use cases and their systemd adapters

pub mod application;
pub mod domain;
pub mod infrastructure;

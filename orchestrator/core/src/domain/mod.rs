// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Gear identity, storage addressing, job and systemd contracts, and host
//! configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value types and contracts shared by every other layer

pub mod identifier;
pub mod job;
pub mod node_config;
pub mod paths;
pub mod systemd;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gear Storage Addressing
//!
//! Deterministic mapping from identifiers and fingerprints onto locations
//! under the host storage root. Path derivation is pure; directory creation
//! is a separate, explicit and fallible step ([`GearPaths::provision_parent`]).
//!
//! Content keyed by `K` lives at `base/K[0:2]/K`; when a second key `S` is
//! attached it lives at `base/K[0:2]/K/S`. The two-character shard bounds the
//! number of entries in any one directory.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Path derivation and directory sharding

use crate::domain::identifier::{Fingerprint, Identifier};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_PATH: &str = "/var/lib/gears";

/// Mode used for every directory the host creates under the storage root.
pub const DIRECTORY_MODE: u32 = 0o770;

/// Which side of a git access grant a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitAccess {
    Read,
    Write,
}

impl GitAccess {
    fn extension(self) -> &'static str {
        match self {
            GitAccess::Read => ".read",
            GitAccess::Write => ".write",
        }
    }
}

/// Place `key` (and optionally `suffix`) under a sharded directory of `base`.
///
/// With an empty suffix the leaf is the key itself: `base/key[0:2]/key`.
/// Otherwise the key owns a directory and the leaf is the suffix:
/// `base/key[0:2]/key/suffix`.
pub fn shard_path(base: &Path, key: &str, suffix: &str) -> PathBuf {
    let shard = key.get(..2).unwrap_or(key);
    let dir = base.join(shard);
    if suffix.is_empty() {
        dir.join(key)
    } else {
        dir.join(key).join(suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GearPaths {
    base: PathBuf,
}

impl GearPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn targets_dir(&self) -> PathBuf {
        self.base.join("targets")
    }

    pub fn units_dir(&self) -> PathBuf {
        self.base.join("units")
    }

    pub fn slices_dir(&self) -> PathBuf {
        self.base.join("slices")
    }

    pub fn unit_path_for(&self, id: &Identifier) -> PathBuf {
        self.units_dir().join(id.unit_name())
    }

    /// Repository directories are not sharded; one directory per gear.
    pub fn repository_path_for(&self, id: &Identifier) -> PathBuf {
        self.base.join("git").join(id.as_str())
    }

    pub fn environment_path_for(&self, id: &Identifier) -> PathBuf {
        shard_path(&self.base.join("env").join("contents"), id.as_str(), "")
    }

    pub fn git_access_path_for(
        &self,
        id: &Identifier,
        fingerprint: &Fingerprint,
        access: GitAccess,
    ) -> PathBuf {
        let leaf = format!("{}{}", fingerprint.to_short_name(), access.extension());
        shard_path(&self.base.join("access").join("git"), id.as_str(), &leaf)
    }

    pub fn ssh_access_path_for(&self, id: &Identifier, fingerprint: &Fingerprint) -> PathBuf {
        shard_path(
            &self.base.join("access").join("gears").join("ssh"),
            id.as_str(),
            &fingerprint.to_short_name(),
        )
    }

    pub fn port_description_path_for(&self, id: &Identifier) -> PathBuf {
        shard_path(&self.base.join("ports").join("descriptions"), id.as_str(), "")
    }

    pub fn public_key_path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        shard_path(
            &self.base.join("keys").join("public"),
            &fingerprint.to_short_name(),
            "",
        )
    }

    /// Subtrees that must exist under the storage root before jobs run.
    pub fn data_directories(&self) -> Vec<PathBuf> {
        vec![
            self.base.clone(),
            self.targets_dir(),
            self.units_dir(),
            self.slices_dir(),
            self.base.join("git"),
            self.base.join("env").join("contents"),
            self.base.join("access").join("git"),
            self.base.join("access").join("gears").join("ssh"),
            self.base.join("keys").join("public"),
            self.base.join("ports").join("descriptions"),
            self.base.join("ports").join("interfaces"),
        ]
    }

    /// Create the directory containing `path` (and its ancestors).
    ///
    /// Idempotent: an existing directory is not an error.
    pub fn provision_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::DirBuilder::new()
                .recursive(true)
                .mode(DIRECTORY_MODE)
                .create(parent),
            _ => Ok(()),
        }
    }
}

impl Default for GearPaths {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Home directory synchronization.
//!
//! A __source tree__ of configuration files is mirrored onto a __target__
//! directory, usually the user's home directory, through symlinks. The
//! source tree is never copied. Every file ends up as a symlink in the target
//! that points back into the source tree, so editing a file in the home
//! directory edits the tracked copy.
//!
//! # Atomic Directories
//!
//! Most directories are _transparent_: they get recreated as real
//! directories in the target, and their contents are linked one by one. That
//! way other programs can still drop their own files next to linked ones,
//! e.g., `~/.config` can hold both tracked and untracked configuration.
//!
//! Some directories should be linked as a whole instead, e.g., `~/.ssh`. A
//! directory that directly contains the __sentinel marker__ file is treated
//! as _atomic_. It is linked with a single symlink and never traversed.
//!
//! # Backups
//!
//! Anything already occupying a target path that is not the correct symlink
//! gets moved into a timestamped __backup directory__ under the target root
//! before the new symlink is created. The backup directory is created once
//! per [`Session`] at most, and is never removed by homesync.
//!
//! # Permission Manifests
//!
//! After linking, [`manifest::apply_manifests`] walks the source tree for
//! permission manifests, and applies the mode bits they describe to entries
//! of their own directory.
//!
//! # See Also
//!
//! 1. [`link`]
//! 2. [`merge`]
//! 3. [`manifest`]
//! 4. [`audit`]

pub mod audit;
pub mod link;
pub mod manifest;
pub mod merge;

use crate::{
    config::{SyncSettings, HOUSEKEEPING},
    path::backup_dir_at,
};

use chrono::Local;
use std::{
    collections::BTreeSet,
    ffi::OsStr,
    fs::{create_dir_all, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Context of a single synchronization run.
///
/// Holds everything that must stay consistent across every operation of a
/// run. Most notably the backup directory, which is only named and created
/// once the first conflicting target shows up, and then reused for the rest
/// of the run.
#[derive(Debug, Clone)]
pub struct Session {
    target_root: PathBuf,
    backup_dir: Option<PathBuf>,
    backup_created: bool,
    dry_run: bool,
    exclusions: Exclusions,

    // Backups a dry run pretended to make, by target and by backup path.
    moved_aside: BTreeSet<PathBuf>,
    claimed_backups: BTreeSet<PathBuf>,
}

impl Session {
    /// Construct new session that mirrors into target root.
    pub fn new(target_root: impl Into<PathBuf>, exclusions: Exclusions) -> Self {
        Self {
            target_root: target_root.into(),
            backup_dir: None,
            backup_created: false,
            dry_run: false,
            exclusions,
            moved_aside: BTreeSet::new(),
            claimed_backups: BTreeSet::new(),
        }
    }

    /// Only report what would happen without touching the file system.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use fixed backup directory rather than a timestamped one.
    ///
    /// The directory is still only created when the first backup happens.
    pub fn with_backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(path.into());
        self
    }

    /// Target root of session.
    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Check if session is a dry run.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// File names that are never mirrored or chmodded.
    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    /// Backup directory of session if one has been named yet.
    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref()
    }

    /// Obtain backup directory, creating it on first use.
    ///
    /// In a dry run the directory is named but never created.
    ///
    /// # Errors
    ///
    /// - Return [`std::io::Error`] if backup directory cannot be created.
    pub(crate) fn ensure_backup_dir(&mut self) -> std::io::Result<PathBuf> {
        let target_root = &self.target_root;
        let path = self
            .backup_dir
            .get_or_insert_with(|| backup_dir_at(target_root, Local::now()))
            .clone();

        if !self.dry_run && !self.backup_created {
            create_dir_all(&path)?;
            self.backup_created = true;
            info!("created backup directory {}", path.display());
        }

        Ok(path)
    }

    /// Remember a backup that a dry run only pretended to make.
    pub(crate) fn plan_backup(&mut self, target: &Path, backup_path: &Path) {
        self.moved_aside.insert(target.to_path_buf());
        self.claimed_backups.insert(backup_path.to_path_buf());
    }

    /// Check if path, or one of its ancestors, was moved aside in a dry run.
    ///
    /// Such a path counts as vacant even though it still exists on disk.
    pub(crate) fn is_moved_aside(&self, path: &Path) -> bool {
        path.ancestors().any(|path| self.moved_aside.contains(path))
    }

    /// Check if backup path is taken, on disk or by a planned backup.
    pub(crate) fn is_backup_taken(&self, backup_path: &Path) -> bool {
        self.claimed_backups.contains(backup_path) || symlink_metadata(backup_path).is_ok()
    }
}

/// File names that are never mirrored into the target, and never touched by
/// permission manifests.
///
/// Always holds the sentinel marker, the manifest file name, and operating
/// system housekeeping files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusions {
    sentinel: String,
    manifest: String,
    names: BTreeSet<String>,
}

impl Exclusions {
    /// Construct new exclusion set from sentinel and manifest names.
    pub fn new(sentinel: impl Into<String>, manifest: impl Into<String>) -> Self {
        let sentinel = sentinel.into();
        let manifest = manifest.into();
        let mut names = HOUSEKEEPING
            .iter()
            .map(ToString::to_string)
            .collect::<BTreeSet<_>>();
        names.insert(sentinel.clone());
        names.insert(manifest.clone());

        Self {
            sentinel,
            manifest,
            names,
        }
    }

    /// Construct exclusion set from settings.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        let mut exclusions = Self::new(settings.sentinel_name(), settings.manifest_name());
        if let Some(extra) = &settings.exclude {
            exclusions.names.extend(extra.iter().cloned());
        }

        exclusions
    }

    /// Exclude another file name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// Name of sentinel marker.
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Name of permission manifest files.
    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    /// Check if file name is excluded.
    pub fn is_excluded(&self, name: &OsStr) -> bool {
        name.to_str().is_some_and(|name| self.names.contains(name))
    }
}

impl Default for Exclusions {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_SENTINEL,
            crate::config::DEFAULT_MANIFEST,
        )
    }
}

/// Tally of a synchronization run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Symlinks created, or that would be created in a dry run.
    pub linked: usize,

    /// Targets that already were the correct symlink.
    pub satisfied: usize,

    /// Conflicting targets moved into the backup directory.
    pub backed_up: usize,

    /// Entries that could not be linked.
    pub failures: Vec<(PathBuf, link::LinkError)>,
}

impl SyncReport {
    /// Check if every entry was linked or already satisfied.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Record the result of one link operation.
    pub fn record(&mut self, target: &Path, result: link::Result<link::LinkOutcome>) {
        match result {
            Ok(link::LinkOutcome::AlreadySatisfied) => self.satisfied += 1,
            Ok(link::LinkOutcome::Linked { backup }) => {
                self.linked += 1;
                if backup.is_some() {
                    self.backed_up += 1;
                }
            }
            Err(error) => {
                warn!("{}: {error}", target.display());
                self.failures.push((target.to_path_buf(), error));
            }
        }
    }

    /// Fold the tally of another run into this one.
    pub fn absorb(&mut self, other: SyncReport) {
        self.linked += other.linked;
        self.satisfied += other.satisfied;
        self.backed_up += other.backed_up;
        self.failures.extend(other.failures);
    }
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Source root to mirror does not exist.
    #[error("source root {:?} does not exist", path.display())]
    MissingSourceRoot { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

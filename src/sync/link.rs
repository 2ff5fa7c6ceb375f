// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Symlink primitive.
//!
//! Every synchronization step boils down to one operation: make a target
//! path a symlink to a source path. Anything that stands in the way is moved
//! into the session's backup directory first, so nothing the user had is
//! ever lost.

use crate::sync::Session;

use std::{
    fs::{canonicalize, create_dir_all, rename, symlink_metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Result of a successful link operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Target already is a symlink to source. Nothing was touched.
    AlreadySatisfied,

    /// Target now is a symlink to source.
    Linked {
        /// Where the previous occupant of target was moved to.
        backup: Option<PathBuf>,
    },
}

/// Make `target` a symlink to `source`.
///
/// Skips targets that already are a symlink resolving to the same path as
/// `source`. Otherwise, anything at `target`, including a broken symlink, is
/// moved into the session's backup directory under its own base name. Parent
/// directories of `target` are created as needed.
///
/// Nothing is mutated when session is a dry run, but the outcome still
/// reports what would have happened.
///
/// # Errors
///
/// - Return [`LinkError::MissingSource`] if source does not exist.
/// - Return [`LinkError::BackupFailed`] if existing target cannot be moved
///   into the backup directory.
/// - Return [`LinkError::PermissionDenied`] if symlink cannot be created due
///   to permissions.
/// - Return [`LinkError::Io`] if parent directory or symlink creation fails
///   for any other reason.
#[instrument(skip(session, source, target), level = "debug")]
pub fn link(
    session: &mut Session,
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
) -> Result<LinkOutcome> {
    let source = source.as_ref();
    let target = target.as_ref();

    // INVARIANT: Never create dangling symlinks.
    if !source.exists() {
        return Err(LinkError::MissingSource {
            source_path: source.to_path_buf(),
        });
    }

    // INVARIANT: Whatever a dry run moved aside no longer occupies the target.
    let vacant = session.is_moved_aside(target);
    if !vacant && is_link_to(target, source) {
        debug!("{} already links to {}", target.display(), source.display());
        return Ok(LinkOutcome::AlreadySatisfied);
    }

    // INVARIANT: Broken symlinks occupy the target path too.
    let backup = if !vacant && symlink_metadata(target).is_ok() {
        Some(backup(session, target)?)
    } else {
        None
    };

    if session.is_dry_run() {
        info!(
            "[dry run] would link {} -> {}",
            target.display(),
            source.display()
        );
        return Ok(LinkOutcome::Linked { backup });
    }

    if let Some(parent) = target.parent() {
        create_dir_all(parent).map_err(|err| LinkError::from_io(err, target))?;
    }

    symlink(source, target).map_err(|err| LinkError::from_io(err, target))?;
    info!("linked {} -> {}", target.display(), source.display());

    Ok(LinkOutcome::Linked { backup })
}

/// Check if `target` is a symlink that resolves to the same path as `source`.
pub fn is_link_to(target: impl AsRef<Path>, source: impl AsRef<Path>) -> bool {
    let target = target.as_ref();
    let is_symlink = symlink_metadata(target)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_symlink {
        return false;
    }

    match (canonicalize(target), canonicalize(source.as_ref())) {
        (Ok(resolved_target), Ok(resolved_source)) => resolved_target == resolved_source,
        _ => false,
    }
}

/// Move `target` into the session's backup directory.
///
/// The backup keeps the base name of `target`. If the backup directory
/// already holds an entry of that name, a numeric suffix is appended so
/// earlier backups of the same run survive. A dry run picks names the same
/// way, counting the backups it only pretended to make.
///
/// # Errors
///
/// - Return [`LinkError::BackupFailed`] if backup directory cannot be
///   created, or the rename fails.
pub(crate) fn backup(session: &mut Session, target: &Path) -> Result<PathBuf> {
    let backup_failed = |err: std::io::Error| LinkError::BackupFailed {
        source: err,
        target: target.to_path_buf(),
    };

    let backup_dir = session.ensure_backup_dir().map_err(backup_failed)?;
    let name = target.file_name().ok_or_else(|| {
        backup_failed(std::io::Error::new(
            ErrorKind::InvalidInput,
            "target has no file name",
        ))
    })?;

    let mut backup_path = backup_dir.join(name);
    let mut suffix = 1;
    while session.is_backup_taken(&backup_path) {
        let mut numbered = name.to_os_string();
        numbered.push(format!(".{suffix}"));
        backup_path = backup_dir.join(numbered);
        suffix += 1;
    }

    if session.is_dry_run() {
        info!(
            "[dry run] would back up {} -> {}",
            target.display(),
            backup_path.display()
        );
        session.plan_backup(target, &backup_path);
        return Ok(backup_path);
    }

    rename(target, &backup_path).map_err(backup_failed)?;
    info!(
        "backed up {} -> {}",
        target.display(),
        backup_path.display()
    );

    Ok(backup_path)
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}

/// Link operation error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Source vanished between discovery and use.
    #[error("source {:?} does not exist", source_path.display())]
    MissingSource { source_path: PathBuf },

    /// Conflicting target could not be moved into the backup directory.
    #[error("failed to back up {:?}", target.display())]
    BackupFailed {
        #[source]
        source: std::io::Error,
        target: PathBuf,
    },

    /// Not allowed to create symlink or its parent directory.
    #[error("permission denied linking {:?}", target.display())]
    PermissionDenied {
        #[source]
        source: std::io::Error,
        target: PathBuf,
    },

    /// Symlink or its parent directory could not be created.
    #[error("failed to link {:?}", target.display())]
    Io {
        #[source]
        source: std::io::Error,
        target: PathBuf,
    },
}

impl LinkError {
    pub(crate) fn from_io(err: std::io::Error, target: &Path) -> Self {
        let target = target.to_path_buf();
        match err.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied {
                source: err,
                target,
            },
            _ => Self::Io {
                source: err,
                target,
            },
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tree merge traversal.
//!
//! Mirror a source tree onto a target directory one entry at a time. See the
//! [`sync`](crate::sync) module documentation for the meaning of atomic and
//! transparent directories.

use crate::sync::{
    link::{self, is_link_to, LinkError},
    Result, Session, SyncError, SyncReport,
};

use std::{
    fs::{create_dir_all, read_dir, symlink_metadata, DirEntry},
    path::Path,
};
use tracing::{debug, info, instrument};

/// Mirror `source_dir` onto `target_dir`.
///
/// Children are visited in lexicographic order of their names. Directories
/// holding the sentinel marker are linked whole, other directories are
/// recreated in the target and traversed, and files are linked. A failing
/// entry is recorded in the returned report, and never stops the walk.
///
/// # Errors
///
/// - Return [`SyncError::MissingSourceRoot`] if `source_dir` does not exist.
#[instrument(skip(session, source_dir, target_dir), level = "debug")]
pub fn merge_tree(
    session: &mut Session,
    source_dir: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<SyncReport> {
    let source_dir = source_dir.as_ref();
    let target_dir = target_dir.as_ref();
    if !source_dir.is_dir() {
        return Err(SyncError::MissingSourceRoot {
            path: source_dir.to_path_buf(),
        });
    }

    info!(
        "mirror {} onto {}",
        source_dir.display(),
        target_dir.display()
    );

    let mut report = SyncReport::default();
    merge_dir(session, source_dir, target_dir, &mut report);
    info!(
        "{} linked, {} already linked, {} backed up, {} failed",
        report.linked,
        report.satisfied,
        report.backed_up,
        report.failures.len()
    );

    Ok(report)
}

/// Link files of `source_dir` only where their directory already exists in
/// `target_dir`.
///
/// No directory is ever created, and the sentinel marker has no meaning
/// here. Meant for trees like per-project files, where a project that is not
/// checked out on this machine must not be conjured up in the target.
///
/// # Errors
///
/// - Return [`SyncError::MissingSourceRoot`] if `source_dir` does not exist.
#[instrument(skip(session, source_dir, target_dir), level = "debug")]
pub fn link_into_existing(
    session: &mut Session,
    source_dir: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<SyncReport> {
    let source_dir = source_dir.as_ref();
    let target_dir = target_dir.as_ref();
    if !source_dir.is_dir() {
        return Err(SyncError::MissingSourceRoot {
            path: source_dir.to_path_buf(),
        });
    }

    let mut report = SyncReport::default();
    link_existing_dir(session, source_dir, target_dir, &mut report);

    Ok(report)
}

/// Check if directory carries the sentinel marker.
pub fn is_atomic(session: &Session, dir: impl AsRef<Path>) -> bool {
    dir.as_ref().join(session.exclusions().sentinel()).is_file()
}

fn merge_dir(session: &mut Session, source_dir: &Path, target_dir: &Path, report: &mut SyncReport) {
    let Some(entries) = sorted_entries(source_dir, target_dir, report) else {
        return;
    };

    for entry in entries {
        let name = entry.file_name();
        if session.exclusions().is_excluded(&name) {
            debug!("skip excluded {}", entry.path().display());
            continue;
        }

        let source = entry.path();
        let target = target_dir.join(&name);

        // INVARIANT: Follow symlinks in source tree, they are linked as what they point to.
        if source.is_dir() {
            if is_atomic(session, &source) {
                let result = link::link(session, &source, &target);
                report.record(&target, result);
                continue;
            }

            if let Err(err) = ensure_dir(session, &source, &target, report) {
                report.record(&target, Err(err));
                continue;
            }

            merge_dir(session, &source, &target, report);
        } else {
            let result = link::link(session, &source, &target);
            report.record(&target, result);
        }
    }
}

fn link_existing_dir(
    session: &mut Session,
    source_dir: &Path,
    target_dir: &Path,
    report: &mut SyncReport,
) {
    if !target_dir.is_dir() {
        debug!("skip {}, not present", target_dir.display());
        return;
    }

    let Some(entries) = sorted_entries(source_dir, target_dir, report) else {
        return;
    };

    for entry in entries {
        let name = entry.file_name();
        if session.exclusions().is_excluded(&name) {
            continue;
        }

        let source = entry.path();
        let target = target_dir.join(&name);
        if source.is_dir() {
            link_existing_dir(session, &source, &target, report);
        } else {
            let result = link::link(session, &source, &target);
            report.record(&target, result);
        }
    }
}

// Children of source directory in lexicographic order. Failure to list them
// is recorded against the target directory.
fn sorted_entries(
    source_dir: &Path,
    target_dir: &Path,
    report: &mut SyncReport,
) -> Option<Vec<DirEntry>> {
    let mut entries = match read_dir(source_dir) {
        Ok(entries) => entries.filter_map(|entry| entry.ok()).collect::<Vec<_>>(),
        Err(err) => {
            report.record(
                target_dir,
                Err(LinkError::Io {
                    source: err,
                    target: target_dir.to_path_buf(),
                }),
            );
            return None;
        }
    };
    entries.sort_by_key(|entry| entry.file_name());

    Some(entries)
}

// Make target a real directory that can hold links of a transparent source directory.
fn ensure_dir(
    session: &mut Session,
    source: &Path,
    target: &Path,
    report: &mut SyncReport,
) -> link::Result<()> {
    if session.is_moved_aside(target) {
        return Ok(());
    }

    // INVARIANT: Never write links into the source tree through a leftover atomic link.
    if is_link_to(target, source) {
        info!(
            "{} is no longer atomic, replacing its link with a directory",
            source.display()
        );
        link::backup(session, target)?;
        report.backed_up += 1;
    } else if symlink_metadata(target).is_ok() && !target.is_dir() {
        return Err(LinkError::Io {
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "target exists and is not a directory",
            ),
            target: target.to_path_buf(),
        });
    }

    if session.is_dry_run() {
        return Ok(());
    }

    create_dir_all(target).map_err(|err| LinkError::from_io(err, target))
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stale symlink audit.
//!
//! Removing a file from the source tree leaves its symlink behind in the
//! target, pointing at nothing. The audit finds these leftovers. It only
//! reports, it never deletes anything.

use crate::path::is_backup_dir_name;

use std::{
    fs::{read_dir, read_link, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Find stale symlinks in `target_root` that point into `source_root`.
///
/// Only the dotted entries at the top of `target_root` are considered. A
/// symlink is stale when its stored path mentions `source_root` but does not
/// resolve to anything. Real directories are searched level by level,
/// symlinked directories and backup directories are not. Unreadable
/// directories are skipped.
#[instrument(skip(target_root, source_root), level = "debug")]
pub fn find_stale(target_root: impl AsRef<Path>, source_root: impl AsRef<Path>) -> Vec<PathBuf> {
    let needle = source_root.as_ref().to_string_lossy().into_owned();
    let mut stale = Vec::new();

    let mut pending = entries_of(target_root.as_ref())
        .into_iter()
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'))
        })
        .filter(|path| {
            !path
                .file_name()
                .is_some_and(|name| is_backup_dir_name(&name.to_string_lossy()))
        })
        .collect::<Vec<_>>();

    while let Some(path) = pending.pop() {
        let Ok(meta) = symlink_metadata(&path) else {
            continue;
        };

        if meta.file_type().is_symlink() {
            if is_stale(&path, &needle) {
                debug!("stale symlink {}", path.display());
                stale.push(path);
            }
        } else if meta.is_dir() {
            pending.extend(entries_of(&path));
        }
    }

    stale.sort();
    stale
}

/// Check if symlink mentions `needle` in its stored path, but is dangling.
fn is_stale(link: &Path, needle: &str) -> bool {
    let Ok(reference) = read_link(link) else {
        return false;
    };

    // INVARIANT: `exists` follows the link, so only dangling links report false.
    reference.to_string_lossy().contains(needle) && !link.exists()
}

fn entries_of(dir: &Path) -> Vec<PathBuf> {
    match read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect(),
        Err(error) => {
            debug!("skip unreadable directory {}: {error}", dir.display());
            Vec::new()
        }
    }
}

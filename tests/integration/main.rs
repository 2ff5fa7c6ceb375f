// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

#![cfg(unix)]

mod sync;

use anyhow::Result;
use homesync::{Exclusions, Session};
use std::{
    fs::{create_dir_all, write},
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// Scratch source tree and home directory.
pub(crate) struct TreeFixture {
    _root: TempDir,
    source: PathBuf,
    home: PathBuf,
}

impl TreeFixture {
    pub(crate) fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let source = root.path().join("dotfiles").join("home");
        let home = root.path().join("home");
        create_dir_all(&source)?;
        create_dir_all(&home)?;

        Ok(Self {
            _root: root,
            source,
            home,
        })
    }

    pub(crate) fn source(&self) -> &Path {
        &self.source
    }

    pub(crate) fn home(&self) -> &Path {
        &self.home
    }

    pub(crate) fn backup(&self) -> PathBuf {
        self.home.join(".dotfiles.test.bck")
    }

    pub(crate) fn session(&self) -> Session {
        Session::new(&self.home, Exclusions::default()).with_backup_dir(self.backup())
    }

    /// Write file into source tree, creating parent directories.
    pub(crate) fn add_source(&self, path: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        write_file(self.source.join(path), contents)
    }

    /// Write file into home directory, creating parent directories.
    pub(crate) fn add_home(&self, path: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<()> {
        write_file(self.home.join(path), contents)
    }

    /// Mark source directory as atomic.
    pub(crate) fn mark_atomic(&self, dir: impl AsRef<Path>) -> Result<()> {
        write_file(self.source.join(dir).join(".linkdir"), "")
    }

    /// Snapshot every path under home directory, sorted.
    pub(crate) fn home_listing(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut pending = vec![self.home.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(|entry| entry.ok()) {
                let path = entry.path();
                if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                    pending.push(path.clone());
                }
                paths.push(path.strip_prefix(&self.home).unwrap().to_path_buf());
            }
        }
        paths.sort();
        paths
    }
}

fn write_file(path: PathBuf, contents: impl AsRef<str>) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    write(path, contents.as_ref())?;
    Ok(())
}

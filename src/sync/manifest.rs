// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Permission manifest application.
//!
//! A __permission manifest__ is a YAML file that may sit in any directory of
//! the source tree. It maps octal modes to glob patterns that are rooted at
//! the manifest's own directory:
//!
//! ```yaml
//! chmod:
//!   "600": ["**/*"]
//!   "700": ["**/", "."]
//! ```
//!
//! # Pattern Rules
//!
//! - `.` matches the manifest's directory itself.
//! - A pattern ending in `/` only matches directories.
//! - Anything else uses standard glob semantics, including `**` for
//!   recursive matching.
//!
//! A manifest never reaches outside of its own directory. Matches named like
//! the sentinel marker, a manifest, or a housekeeping file are never touched.
//!
//! # Ordering
//!
//! Every match of a manifest is resolved before any mode is changed, and a
//! later rule wins over an earlier rule for the same path. Modes are applied
//! deepest path first, so a directory losing its search bit cannot lock out
//! its own children halfway through.

use crate::{
    config::{ConfigError, PermissionManifest},
    sync::Session,
};

use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use std::{
    cmp::Reverse,
    collections::BTreeMap,
    fs::{canonicalize, read_to_string, symlink_metadata},
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Apply every permission manifest found under `root_dir`.
///
/// Manifests are applied in file name order of the walk. A manifest that
/// cannot be read or parsed is skipped with a warning, as is any single rule
/// with an invalid mode. Returns the number of paths whose mode was changed,
/// or would have been changed in a dry run.
#[instrument(skip(session, root_dir), level = "debug")]
pub fn apply_manifests(session: &Session, root_dir: impl AsRef<Path>) -> usize {
    let root_dir = root_dir.as_ref();
    let mut changed = 0;

    for manifest in find_manifests(session, root_dir) {
        match apply_manifest(session, &manifest) {
            Ok(count) => changed += count,
            Err(error) => warn!("skip manifest {}: {error}", manifest.display()),
        }
    }

    info!("applied permissions to {changed} paths");
    changed
}

/// Find every permission manifest under `root_dir`.
///
/// Does not follow symlinks. Unreadable directories are skipped.
pub fn find_manifests(session: &Session, root_dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let manifest_name = session.exclusions().manifest();
    WalkBuilder::new(root_dir.as_ref())
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!("skip unreadable entry: {error}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
        .filter(|entry| entry.file_name() == manifest_name)
        .map(|entry| entry.into_path())
        .collect()
}

/// Apply a single permission manifest.
///
/// # Errors
///
/// - Return [`ManifestError::Read`] if manifest cannot be read.
/// - Return [`ManifestError::MalformedManifest`] if manifest cannot be
///   parsed.
#[instrument(skip(session, manifest_path), level = "debug")]
pub fn apply_manifest(session: &Session, manifest_path: impl AsRef<Path>) -> Result<usize> {
    let manifest_path = manifest_path.as_ref();
    let scope = manifest_path.parent().unwrap_or(Path::new("."));
    let content = read_to_string(manifest_path).map_err(|err| ManifestError::Read {
        source: err,
        manifest_path: manifest_path.to_path_buf(),
    })?;
    let manifest: PermissionManifest =
        content
            .parse()
            .map_err(|err| ManifestError::MalformedManifest {
                source: err,
                manifest_path: manifest_path.to_path_buf(),
            })?;

    let mut plan = BTreeMap::new();
    for rule in manifest.rules() {
        let rule = match rule {
            Ok(rule) => rule,
            Err(error) => {
                warn!("{}: {error}", manifest_path.display());
                continue;
            }
        };

        for pattern in &rule.patterns {
            match resolve_pattern(session, scope, pattern) {
                Ok(matches) => {
                    for path in matches {
                        plan.insert(path, rule.mode);
                    }
                }
                Err(error) => warn!("{}: {error}", manifest_path.display()),
            }
        }
    }

    // INVARIANT: Children before parents.
    let mut plan = plan.into_iter().collect::<Vec<_>>();
    plan.sort_by_key(|(path, _)| Reverse(path.components().count()));

    let mut changed = 0;
    for (path, mode) in plan {
        if session.is_dry_run() {
            info!("[dry run] would chmod {mode:o} {}", path.display());
            changed += 1;
            continue;
        }

        match set_mode(&path, mode) {
            Ok(()) => {
                debug!("chmod {mode:o} {}", path.display());
                changed += 1;
            }
            Err(err) if err.kind() == ErrorKind::PermissionDenied && path == scope => {
                warn!("permission denied: chmod {mode:o} {}", path.display());
            }
            Err(err) if matches!(err.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => {
                debug!("skip chmod {mode:o} {}: {err}", path.display());
            }
            Err(err) => warn!("failed to chmod {mode:o} {}: {err}", path.display()),
        }
    }

    Ok(changed)
}

/// Resolve a manifest pattern into the paths it matches.
///
/// Matches that resolve outside of `scope`, e.g., through a symlinked
/// directory, are dropped.
///
/// # Errors
///
/// - Return [`ManifestError::Glob`] if pattern is not a valid glob.
/// - Return [`ManifestError::NonUnicodePath`] if the manifest directory
///   cannot be expressed as a glob.
pub fn resolve_pattern(session: &Session, scope: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if pattern == "." {
        return Ok(vec![scope.to_path_buf()]);
    }

    let dirs_only = pattern.ends_with('/');
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() || pattern == "." {
        return Ok(vec![scope.to_path_buf()]);
    }

    let root = scope.to_str().ok_or_else(|| ManifestError::NonUnicodePath {
        path: scope.to_path_buf(),
    })?;
    let root = Pattern::escape(root.trim_end_matches('/'));
    let mut matches = glob_matches(&format!("{root}/{pattern}"), pattern)?;

    // INVARIANT: A recursive directory pattern includes the directory it starts from.
    if dirs_only {
        if pattern == "**" {
            matches.push(scope.to_path_buf());
        } else if let Some(parent) = pattern.strip_suffix("/**") {
            matches.extend(glob_matches(&format!("{root}/{parent}"), pattern)?);
        }
    }

    let Ok(real_scope) = canonicalize(scope) else {
        debug!("skip vanished manifest directory {}", scope.display());
        return Ok(Vec::new());
    };

    let matches = matches
        .into_iter()
        .filter(|path| is_within(scope, path))
        .filter(|path| resolves_within(&real_scope, path))
        .filter(|path| {
            path.file_name()
                .is_none_or(|name| !session.exclusions().is_excluded(name))
        })
        .filter(|path| !dirs_only || path.is_dir())
        .collect();

    Ok(matches)
}

fn glob_matches(full: &str, pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let paths = glob::glob_with(full, options).map_err(|err| ManifestError::Glob {
        source: err,
        pattern: pattern.to_string(),
    })?;

    Ok(paths
        .filter_map(|path| match path {
            Ok(path) => Some(path),
            Err(error) => {
                debug!("skip unreadable match: {error}");
                None
            }
        })
        .collect())
}

// Lexical containment, a match must not climb out through "..".
fn is_within(scope: &Path, path: &Path) -> bool {
    path.strip_prefix(scope).is_ok_and(|relative| {
        relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
    })
}

// Physical containment, a match must not leave through a symlink. Broken
// symlinks resolve nowhere, and are left for the chmod to absorb.
fn resolves_within(real_scope: &Path, path: &Path) -> bool {
    match canonicalize(path) {
        Ok(real_path) => real_path.starts_with(real_scope),
        Err(err) => err.kind() == ErrorKind::NotFound && is_broken_symlink(path),
    }
}

fn is_broken_symlink(path: &Path) -> bool {
    symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::{fs::Permissions, os::unix::fs::PermissionsExt};
    std::fs::set_permissions(path, Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Err(std::io::Error::from(ErrorKind::Unsupported))
}

/// Permission manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file cannot be read.
    #[error("failed to read manifest {:?}", manifest_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    /// Manifest file is not a valid document.
    #[error("malformed manifest {:?}", manifest_path.display())]
    MalformedManifest {
        #[source]
        source: ConfigError,
        manifest_path: PathBuf,
    },

    /// Pattern is not a valid glob.
    #[error("invalid pattern {pattern:?}")]
    Glob {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Manifest directory is not valid unicode.
    #[error("cannot glob in non-unicode directory {:?}", path.display())]
    NonUnicodePath { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use chrono::{DateTime, Local};
use std::{
    env,
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine absolute path to the dotfiles checkout.
///
/// Uses `$DOTFILES` when set and non-empty, otherwise `~/.dotfiles`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn dotfiles_dir() -> Result<PathBuf> {
    match env::var_os("DOTFILES") {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => home_dir().map(|home| home.join(".dotfiles")),
    }
}

/// Determine default source root to mirror into the home directory.
///
/// The source root is the `home` directory of the dotfiles checkout.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_source_dir() -> Result<PathBuf> {
    dotfiles_dir().map(|path| path.join("home"))
}

/// Determine default absolute path to the settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/homesync/config.toml`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("homesync").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the Dropbox folder.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_dropbox_dir() -> Result<PathBuf> {
    home_dir().map(|home| home.join("Dropbox"))
}

/// Determine absolute path to the device identity file.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn device_id_file() -> Result<PathBuf> {
    home_dir().map(|home| home.join(".device_id"))
}

/// Name a backup directory under `target_root` after a point in time.
///
/// Produces `<target_root>/.dotfiles.<YYYYmmdd-HHMMSS>.bck`.
pub fn backup_dir_at(target_root: impl AsRef<Path>, when: DateTime<Local>) -> PathBuf {
    target_root
        .as_ref()
        .join(format!(".dotfiles.{}.bck", when.format("%Y%m%d-%H%M%S")))
}

/// Check whether a file name looks like a backup directory name.
pub fn is_backup_dir_name(name: &str) -> bool {
    name.starts_with(".dotfiles.") && name.ends_with(".bck")
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

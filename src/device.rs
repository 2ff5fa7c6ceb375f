// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Device identity.
//!
//! Every machine gets a short __device id__, e.g., "macbook-pro", stored in
//! `~/.device_id`. Device-specific files in the Dropbox folder are keyed by
//! it, most notably the shell history, so that each machine keeps its own
//! history file while all of them stay in sync.

use inquire::{
    validator::{ErrorMessage, Validation},
    InquireError, Text,
};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{copy, create_dir_all, read_dir, read_to_string, symlink_metadata, write, File},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{info, instrument};

/// Prefix of per-device shell history files.
pub const HISTORY_PREFIX: &str = ".zsh_history.";

/// Identifier of the current machine.
///
/// # Invariant
///
/// - Only lowercase ASCII letters, digits, and dashes.
/// - Starts with a letter.
/// - Does not end with a dash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Check if text is a valid device id.
    pub fn is_valid(id: &str) -> bool {
        let mut chars = id.chars();
        let Some(first) = chars.next() else {
            return false;
        };

        first.is_ascii_lowercase()
            && !id.ends_with('-')
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    /// Load device id from file.
    ///
    /// Returns `None` if the file does not exist or is blank.
    ///
    /// # Errors
    ///
    /// - Return [`DeviceError::Read`] if file cannot be read.
    /// - Return [`DeviceError::InvalidDeviceId`] if file content is not a
    ///   valid device id.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = match read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(DeviceError::Read {
                    source: err,
                    path: path.to_path_buf(),
                })
            }
        };

        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        content.parse().map(Some)
    }

    /// Save device id to file.
    ///
    /// # Errors
    ///
    /// - Return [`DeviceError::Write`] if file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write(path.as_ref(), self.0.as_bytes()).map_err(|err| DeviceError::Write {
            source: err,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Treat device id as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = DeviceError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(DeviceError::InvalidDeviceId(id.to_string()))
        }
    }
}

impl Display for DeviceId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.0)
    }
}

/// List device ids that already have a history file in `history_dir`.
///
/// Missing or unreadable directory means no known devices.
pub fn known_device_ids(history_dir: impl AsRef<Path>) -> Vec<String> {
    let Ok(entries) = read_dir(history_dir.as_ref()) else {
        return Vec::new();
    };

    let mut ids = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(HISTORY_PREFIX))
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
        })
        .collect::<Vec<_>>();
    ids.sort();
    ids
}

/// Ask user for device id.
///
/// Known device ids are offered as suggestions. Returns `None` if the user
/// enters nothing, or cancels the prompt.
///
/// # Errors
///
/// - Return [`DeviceError::Prompt`] if the prompt itself fails.
pub fn prompt_device_id(known: &[String]) -> Result<Option<DeviceId>> {
    let help = if known.is_empty() {
        "lowercase, dash-case, starting with a letter".to_string()
    } else {
        format!("known devices: {}", known.join(", "))
    };

    let suggestions = known.to_vec();
    let answer = Text::new("device name (e.g. macbook-pro):")
        .with_help_message(&help)
        .with_autocomplete(move |input: &str| {
            Ok(suggestions
                .iter()
                .filter(|id| id.starts_with(input))
                .cloned()
                .collect::<Vec<_>>())
        })
        .with_validator(|input: &str| {
            if input.trim().is_empty() || DeviceId::is_valid(input.trim()) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid(ErrorMessage::Custom(
                    "use lowercase, dash-case, starting with a letter".into(),
                )))
            }
        })
        .prompt();

    match answer {
        Ok(answer) if answer.trim().is_empty() => Ok(None),
        Ok(answer) => answer.trim().parse().map(Some),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(err) => Err(DeviceError::Prompt(err)),
    }
}

/// Path to history file of device in `history_dir`.
pub fn device_history_file(history_dir: impl AsRef<Path>, device: &DeviceId) -> PathBuf {
    history_dir
        .as_ref()
        .join(format!("{HISTORY_PREFIX}{device}"))
}

/// Make sure device has a history file in `history_dir`.
///
/// A new history file is seeded from `local_history` when that is a real
/// file, i.e., not a symlink into the sync folder. Otherwise it starts out
/// empty. Existing history files are left alone.
///
/// # Errors
///
/// - Return [`DeviceError::Write`] if history directory or file cannot be
///   created.
#[instrument(skip(history_dir, device, local_history), level = "debug")]
pub fn ensure_device_history(
    history_dir: impl AsRef<Path>,
    device: &DeviceId,
    local_history: impl AsRef<Path>,
) -> Result<PathBuf> {
    let history_dir = history_dir.as_ref();
    let local_history = local_history.as_ref();
    let history = device_history_file(history_dir, device);
    let write_error = |err: std::io::Error, path: &Path| DeviceError::Write {
        source: err,
        path: path.to_path_buf(),
    };

    create_dir_all(history_dir).map_err(|err| write_error(err, history_dir))?;
    if history.exists() {
        return Ok(history);
    }

    let is_real_file = symlink_metadata(local_history)
        .map(|meta| meta.file_type().is_file())
        .unwrap_or(false);
    if is_real_file {
        info!(
            "copy existing history {} to {}",
            local_history.display(),
            history.display()
        );
        copy(local_history, &history).map_err(|err| write_error(err, &history))?;
    } else {
        info!("create {}", history.display());
        File::create(&history).map_err(|err| write_error(err, &history))?;
    }

    Ok(history)
}

/// Device identity error types.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Device id does not follow naming rules.
    #[error("invalid device id {0:?}, use lowercase, dash-case, starting with a letter")]
    InvalidDeviceId(String),

    /// Device file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Device file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Interactive prompt failed.
    #[error(transparent)]
    Prompt(#[from] InquireError),
}

/// Friendly result alias :3
pub type Result<T, E = DeviceError> = std::result::Result<T, E>;

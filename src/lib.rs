// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Home directory synchronizer.
//!
//! Mirror a tree of dotfiles into the home directory through symlinks, back
//! up whatever stands in the way, and apply permission manifests. See
//! [`sync`] for the details of the mirroring model.

pub mod config;
pub mod device;
pub mod path;
pub mod sync;

pub use sync::{
    audit::find_stale,
    link::{link, LinkError, LinkOutcome},
    manifest::apply_manifests,
    merge::{link_into_existing, merge_tree},
    Exclusions, Session, SyncError, SyncReport,
};

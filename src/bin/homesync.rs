// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use homesync::{
    config::Settings,
    device::{self, DeviceId},
    path::{default_config_file, default_dropbox_dir, default_source_dir, device_id_file, home_dir},
    sync::{
        audit::find_stale,
        link::link,
        manifest::apply_manifests,
        merge::{link_into_existing, merge_tree},
    },
    Exclusions, Session, SyncReport,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HISTORY_DIR: &str = "zsh_history";
const PROJECTS_DIR: &str = "projects";
const SCRIPTS_DIR: &str = "scripts";

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "homesync [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<bool> {
        let settings = load_settings(self.config)?;
        match self.command {
            Command::Link(opts) => run_link(&settings, opts),
            Command::Audit(opts) => run_audit(&settings, opts),
            Command::Dropbox(opts) => run_dropbox(&settings, opts),
            Command::Device(opts) => run_device(&settings, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Symlink source tree into home directory, and apply permissions.
    #[command(override_usage = "homesync link [options]")]
    Link(LinkOptions),

    /// Report symlinks that point at removed source files.
    #[command(override_usage = "homesync audit [options]")]
    Audit(AuditOptions),

    /// Symlink Dropbox dotfiles into home directory.
    #[command(override_usage = "homesync dropbox [options]")]
    Dropbox(DropboxOptions),

    /// Show or set device id of this machine.
    #[command(override_usage = "homesync device [<device_id>]")]
    Device(DeviceOptions),
}

#[derive(Args, Clone, Debug)]
struct RootOptions {
    /// Source tree to mirror.
    #[arg(short, long, value_name = "dir")]
    pub source: Option<PathBuf>,

    /// Directory to mirror source tree into.
    #[arg(short, long, value_name = "dir")]
    pub target: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LinkOptions {
    #[command(flatten)]
    pub roots: RootOptions,

    /// Show what would be done without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not apply permission manifests.
    #[arg(long)]
    pub no_permissions: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AuditOptions {
    #[command(flatten)]
    pub roots: RootOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DropboxOptions {
    /// Path to Dropbox folder.
    #[arg(short, long, value_name = "dir")]
    pub dir: Option<PathBuf>,

    /// Show what would be done without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeviceOptions {
    /// New device id to store.
    #[arg(value_name = "device_id")]
    pub device_id: Option<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run() -> Result<bool> {
    Cli::parse().run()
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => default_config_file()?,
    };

    match read_to_string(&path) {
        Ok(content) => content
            .parse()
            .with_context(|| format!("invalid settings file {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Settings::default()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read settings file {}", path.display()))
        }
    }
}

fn resolve_roots(settings: &Settings, roots: RootOptions) -> Result<(PathBuf, PathBuf)> {
    let source = match roots.source.or_else(|| settings.settings.source.clone()) {
        Some(source) => source,
        None => default_source_dir()?,
    };
    let target = match roots.target.or_else(|| settings.settings.target.clone()) {
        Some(target) => target,
        None => home_dir()?,
    };

    Ok((source, target))
}

fn report_summary(report: &SyncReport, dry_run: bool) -> bool {
    if !report.is_success() {
        error!("completed with {} error(s)", report.failures.len());
        return false;
    }

    if dry_run {
        info!("dry run complete, nothing was changed");
    } else {
        info!("all files linked");
    }

    true
}

fn run_link(settings: &Settings, opts: LinkOptions) -> Result<bool> {
    let (source, target) = resolve_roots(settings, opts.roots)?;
    let exclusions = Exclusions::from_settings(&settings.settings);
    let mut session = Session::new(&target, exclusions).with_dry_run(opts.dry_run);
    if opts.dry_run {
        info!("dry run, no changes will be made");
    }

    let report = merge_tree(&mut session, &source, &target)?;
    if !opts.no_permissions {
        apply_manifests(&session, &source);
    }

    Ok(report_summary(&report, opts.dry_run))
}

fn run_audit(settings: &Settings, opts: AuditOptions) -> Result<bool> {
    let (source, target) = resolve_roots(settings, opts.roots)?;
    let stale = find_stale(&target, &source);
    if stale.is_empty() {
        info!("no stale symlinks in {}", target.display());
    }

    for path in stale {
        println!("{}", path.display());
    }

    Ok(true)
}

fn run_dropbox(settings: &Settings, opts: DropboxOptions) -> Result<bool> {
    let dropbox = match opts.dir.or_else(|| settings.dropbox.dir.clone()) {
        Some(dir) => dir,
        None => default_dropbox_dir()?,
    };
    let dropbox_dotfiles = dropbox.join("dotfiles");
    if !dropbox_dotfiles.is_dir() {
        warn!(
            "Dropbox dotfiles not found at {}, skipping",
            dropbox_dotfiles.display()
        );
        return Ok(true);
    }

    let target = match settings.settings.target.clone() {
        Some(target) => target,
        None => home_dir()?,
    };
    // INVARIANT: Per-device history files are set up below, never mirrored.
    // INVARIANT: Project files only go into projects already on this machine.
    let exclusions = Exclusions::from_settings(&settings.settings)
        .with_name(HISTORY_DIR)
        .with_name(PROJECTS_DIR);
    let mut session = Session::new(&target, exclusions).with_dry_run(opts.dry_run);

    let mut report = merge_tree(&mut session, &dropbox_dotfiles, &target)?;
    let projects = dropbox_dotfiles.join(PROJECTS_DIR);
    if projects.is_dir() {
        report.absorb(link_into_existing(
            &mut session,
            &projects,
            target.join(PROJECTS_DIR),
        )?);
    }

    let scripts = dropbox.join(SCRIPTS_DIR);
    if scripts.is_dir() {
        let scripts_target = target.join(SCRIPTS_DIR);
        let result = link(&mut session, &scripts, &scripts_target);
        report.record(&scripts_target, result);
    }

    apply_manifests(&session, &dropbox_dotfiles);

    if opts.dry_run {
        info!("dry run, skipping shell history setup");
    } else {
        setup_history(&dropbox_dotfiles, &target)?;
    }

    Ok(report_summary(&report, opts.dry_run))
}

fn setup_history(dropbox_dotfiles: &Path, target: &Path) -> Result<()> {
    let history_dir = dropbox_dotfiles.join(HISTORY_DIR);
    let device = match DeviceId::load(device_id_file()?)? {
        Some(device) => device,
        None => {
            warn!("no device id set, skipping shell history setup");
            return Ok(());
        }
    };

    let history =
        device::ensure_device_history(&history_dir, &device, target.join(".zsh_history"))?;
    info!("HISTFILE will use {}", history.display());

    Ok(())
}

fn run_device(settings: &Settings, opts: DeviceOptions) -> Result<bool> {
    let path = device_id_file()?;
    if let Some(device_id) = opts.device_id {
        let device: DeviceId = device_id.parse()?;
        device.save(&path)?;
        info!("device id set to {device}");
        return Ok(true);
    }

    if let Some(device) = DeviceId::load(&path)? {
        println!("{device}");
        return Ok(true);
    }

    let dropbox = match settings.dropbox.dir.clone() {
        Some(dir) => dir,
        None => default_dropbox_dir()?,
    };
    let known = device::known_device_ids(dropbox.join("dotfiles").join(HISTORY_DIR));
    match device::prompt_device_id(&known)? {
        Some(device) => {
            device.save(&path)?;
            info!("device id set to {device}");
            Ok(true)
        }
        None => {
            warn!("no device id provided");
            Ok(false)
        }
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::TreeFixture;

use anyhow::Result;
use homesync::{apply_manifests, find_stale, merge_tree};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{
    fs::{metadata, read_link, read_to_string, remove_file, symlink_metadata},
    os::unix::fs::PermissionsExt,
    path::PathBuf,
};

#[test]
fn mirror_files_transparent_and_atomic_dirs() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".zshrc", "export EDITOR=nvim")?;
    fixture.add_source(".config/nvim/init.lua", "vim.g.mapleader = ' '")?;
    fixture.add_source(".ssh/config", "Host *")?;
    fixture.add_source(".ssh/keys/id_ed25519", "secret")?;
    fixture.mark_atomic(".ssh")?;

    let mut session = fixture.session();
    let report = merge_tree(&mut session, fixture.source(), fixture.home())?;

    assert!(report.is_success());
    assert_eq!(report.linked, 3);
    assert_eq!(
        read_link(fixture.home().join(".zshrc"))?,
        fixture.source().join(".zshrc")
    );
    assert_eq!(
        read_link(fixture.home().join(".config/nvim/init.lua"))?,
        fixture.source().join(".config/nvim/init.lua")
    );
    assert_eq!(
        read_link(fixture.home().join(".ssh"))?,
        fixture.source().join(".ssh")
    );
    assert!(!symlink_metadata(fixture.home().join(".config"))?
        .file_type()
        .is_symlink());

    let expect = vec![
        PathBuf::from(".config"),
        PathBuf::from(".config/nvim"),
        PathBuf::from(".config/nvim/init.lua"),
        PathBuf::from(".ssh"),
        PathBuf::from(".zshrc"),
    ];
    assert_eq!(fixture.home_listing(), expect);

    Ok(())
}

#[test]
fn second_run_changes_nothing() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".zshrc", "")?;
    fixture.add_source(".config/git/config", "")?;
    fixture.add_source(".aws/credentials", "")?;
    fixture.mark_atomic(".aws")?;
    fixture.add_home(".zshrc", "old")?;

    let mut session = fixture.session();
    let first = merge_tree(&mut session, fixture.source(), fixture.home())?;
    assert_eq!(first.linked, 3);
    assert_eq!(first.backed_up, 1);
    let listing = fixture.home_listing();

    let mut session = fixture.session();
    let second = merge_tree(&mut session, fixture.source(), fixture.home())?;
    assert!(second.is_success());
    assert_eq!(second.linked, 0);
    assert_eq!(second.backed_up, 0);
    assert_eq!(second.satisfied, 3);
    assert_eq!(fixture.home_listing(), listing);

    Ok(())
}

#[test]
fn conflicting_file_is_recoverable_from_backup() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".gitconfig", "[user]\n\tname = new")?;
    fixture.add_home(".gitconfig", "[user]\n\tname = old")?;
    fixture.add_source(".config/htop/htoprc", "new")?;
    fixture.add_home(".config/htop/htoprc", "old htop")?;

    let mut session = fixture.session();
    let report = merge_tree(&mut session, fixture.source(), fixture.home())?;

    assert!(report.is_success());
    assert_eq!(report.backed_up, 2);
    assert_eq!(
        read_to_string(fixture.backup().join(".gitconfig"))?,
        "[user]\n\tname = old"
    );
    assert_eq!(
        read_to_string(fixture.backup().join("htoprc"))?,
        "old htop"
    );
    assert_eq!(
        read_link(fixture.home().join(".gitconfig"))?,
        fixture.source().join(".gitconfig")
    );

    Ok(())
}

#[test]
fn dry_run_reports_without_mutation() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".zshrc", "new")?;
    fixture.add_source(".config/nvim/init.lua", "")?;
    fixture.add_home(".zshrc", "old")?;
    let listing = fixture.home_listing();

    let mut session = fixture.session().with_dry_run(true);
    let report = merge_tree(&mut session, fixture.source(), fixture.home())?;

    assert!(report.is_success());
    assert_eq!(report.linked, 2);
    assert_eq!(report.backed_up, 1);
    assert_eq!(fixture.home_listing(), listing);
    assert_eq!(read_to_string(fixture.home().join(".zshrc"))?, "old");

    Ok(())
}

#[test]
fn dry_run_matches_real_run_over_leftover_atomic_link() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".vim/vimrc", "set nocompatible")?;
    fixture.add_source(".vim/colors/gruvbox.vim", "")?;
    std::os::unix::fs::symlink(fixture.source().join(".vim"), fixture.home().join(".vim"))?;
    let listing = fixture.home_listing();

    let mut session = fixture.session().with_dry_run(true);
    let dry = merge_tree(&mut session, fixture.source(), fixture.home())?;
    assert_eq!(fixture.home_listing(), listing);

    let mut session = fixture.session();
    let real = merge_tree(&mut session, fixture.source(), fixture.home())?;

    assert!(dry.is_success());
    assert!(real.is_success());
    assert_eq!(
        (dry.linked, dry.satisfied, dry.backed_up),
        (real.linked, real.satisfied, real.backed_up)
    );
    assert_eq!((real.linked, real.backed_up), (2, 1));
    assert!(!symlink_metadata(fixture.home().join(".vim"))?
        .file_type()
        .is_symlink());

    Ok(())
}

#[test]
fn manifest_applies_through_linked_atomic_dir() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".ssh/config", "Host *")?;
    fixture.add_source(".ssh/keys/id_ed25519", "secret")?;
    fixture.mark_atomic(".ssh")?;
    fixture.add_source(
        ".ssh/.permissions.yaml",
        indoc! {r#"
            chmod:
              "600": ["**/*"]
              "700": ["**/"]
        "#},
    )?;
    let manifest_mode = mode_of(fixture.source().join(".ssh/.permissions.yaml"));
    let marker_mode = mode_of(fixture.source().join(".ssh/.linkdir"));

    let mut session = fixture.session();
    merge_tree(&mut session, fixture.source(), fixture.home())?;
    apply_manifests(&session, fixture.source());

    let ssh = fixture.home().join(".ssh");
    assert_eq!(mode_of(&ssh), 0o700);
    assert_eq!(mode_of(ssh.join("config")), 0o600);
    assert_eq!(mode_of(ssh.join("keys/id_ed25519")), 0o600);
    assert_eq!(mode_of(ssh.join("keys")), 0o700);
    assert_eq!(mode_of(ssh.join(".permissions.yaml")), manifest_mode);
    assert_eq!(mode_of(ssh.join(".linkdir")), marker_mode);

    Ok(())
}

#[test]
fn manifest_never_leaks_into_sibling() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".kube/config", "")?;
    fixture.add_source(".kube-old/config", "")?;
    set_mode(fixture.source().join(".kube-old/config"), 0o644)?;
    fixture.add_source(
        ".kube/.permissions.yaml",
        indoc! {r#"
            chmod:
              "600": ["*", "../.kube-old/*"]
        "#},
    )?;

    let session = fixture.session();
    apply_manifests(&session, fixture.source());

    assert_eq!(mode_of(fixture.source().join(".kube/config")), 0o600);
    assert_eq!(mode_of(fixture.source().join(".kube-old/config")), 0o644);

    Ok(())
}

#[test]
fn audit_finds_links_of_removed_sources() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.add_source(".foo", "")?;
    fixture.add_source(".bar", "")?;
    fixture.add_source(".config/tool/settings.json", "")?;

    let mut session = fixture.session();
    merge_tree(&mut session, fixture.source(), fixture.home())?;
    assert!(find_stale(fixture.home(), fixture.source()).is_empty());

    remove_file(fixture.source().join(".foo"))?;
    remove_file(fixture.source().join(".config/tool/settings.json"))?;

    let result = find_stale(fixture.home(), fixture.source());
    let expect = vec![
        fixture.home().join(".config/tool/settings.json"),
        fixture.home().join(".foo"),
    ];
    assert_eq!(result, expect);

    Ok(())
}

fn mode_of(path: impl AsRef<std::path::Path>) -> u32 {
    metadata(path).unwrap().permissions().mode() & 0o7777
}

fn set_mode(path: impl AsRef<std::path::Path>, mode: u32) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

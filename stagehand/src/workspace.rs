//! Scratch copies of templates and kube configs.
//!
//! Copies outlive the process: later invocations of the same run load their
//! paths from state, so nothing here is removed on drop.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use stagehand_common::{HarnessError, HarnessResult};
use tracing::{debug, info};

/// Copy the repository holding `examples_dir` into a fresh temp dir and
/// return the copied examples directory.
///
/// The whole root is copied so relative module sources such as
/// `../../modules/gke` still resolve inside the copy. Hidden entries and
/// local Terraform state are left behind.
pub fn copy_examples_to_temp(examples_dir: &Path) -> HarnessResult<PathBuf> {
    if !examples_dir.is_dir() {
        return Err(HarnessError::Config(format!(
            "template directory {} does not exist",
            examples_dir.display()
        )));
    }
    let examples_dir = examples_dir.canonicalize()?;
    let (Some(repo_root), Some(examples_name)) = (examples_dir.parent(), examples_dir.file_name())
    else {
        return copy_dir_to_temp(&examples_dir);
    };
    let copied_root = copy_dir_to_temp(repo_root)?;
    Ok(copied_root.join(examples_name))
}

/// Copy `source` into a fresh temp dir; returns the copy's path.
///
/// Hidden entries and local Terraform state are left behind.
pub fn copy_dir_to_temp(source: &Path) -> HarnessResult<PathBuf> {
    if !source.is_dir() {
        return Err(HarnessError::Config(format!(
            "template directory {} does not exist",
            source.display()
        )));
    }
    let root = tempfile::Builder::new()
        .prefix("stagehand-")
        .tempdir()?
        .keep();
    let name = source
        .file_name()
        .map_or_else(|| PathBuf::from("templates"), PathBuf::from);
    let dest = root.join(name);
    copy_tree(source, &dest)?;
    info!(from = %source.display(), to = %dest.display(), "Copied templates");
    Ok(dest)
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            debug!(path = %entry.path().display(), "Skipping");
            continue;
        }
        let target = dest.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn should_skip(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".tfstate") || name.ends_with(".tfstate.backup")
}

/// Copy the kube config at `source` to a temp file; returns its path.
///
/// A missing source yields an empty file for credential helpers to fill.
pub fn copy_kube_config_to_temp(source: Option<&Path>) -> HarnessResult<PathBuf> {
    let (_, path) = tempfile::Builder::new()
        .prefix("kubeconfig-")
        .tempfile()?
        .keep()
        .map_err(|e| HarnessError::Io(e.error))?;
    match source {
        Some(src) if src.is_file() => {
            fs::copy(src, &path)?;
            info!(from = %src.display(), to = %path.display(), "Copied kube config");
        }
        _ => info!(path = %path.display(), "No kube config to copy; starting empty"),
    }
    Ok(path)
}

/// Remove a file; already gone counts as removed.
pub fn remove_file_if_present(path: &Path) -> HarnessResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Already removed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

//! Resynchronize a node's data directory from a healthy peer
//!
//! Only for stopped nodes. Lock files and the validator signing state are
//! node-local and never cross over; the target keeps its own.

use crate::cluster::node_dir;
use crate::config::{DATA_DIR, PRIV_VALIDATOR_STATE_FILE};
use crate::{NodeError, NodeResult};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

const LOCK_SUFFIX: &str = "LOCK";

/// What a recovery run touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub copied_files: usize,
    pub copied_dirs: usize,
    pub skipped_files: usize,
}

/// Files that belong to one node only
pub fn is_node_local(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.ends_with(LOCK_SUFFIX) || name.ends_with(PRIV_VALIDATOR_STATE_FILE)
}

/// Copy `reference`'s data subtree onto `target`'s.
///
/// Each top-level directory under the reference data directory replaces the
/// target's directory of the same name; top-level files are overwritten.
pub fn recover<P: AsRef<Path>>(base: P, target: usize, reference: usize) -> NodeResult<RecoveryReport> {
    if target == reference {
        return Err(NodeError::Recovery(format!(
            "node {} cannot be recovered from itself",
            target
        )));
    }

    let target_dir = node_dir(&base, target);
    let reference_dir = node_dir(&base, reference);
    for dir in [&target_dir, &reference_dir] {
        if !dir.is_dir() {
            return Err(NodeError::Recovery(format!(
                "{} is not a node directory",
                dir.display()
            )));
        }
    }

    let src = reference_dir.join(DATA_DIR);
    if !src.is_dir() {
        return Err(NodeError::Recovery(format!(
            "reference node has no data directory at {}",
            src.display()
        )));
    }
    let dst = target_dir.join(DATA_DIR);
    fs::create_dir_all(&dst)?;

    let mut report = RecoveryReport::default();
    for entry in fs::read_dir(&src)? {
        let entry = entry?;
        let name = entry.file_name();
        let dest = dst.join(&name);

        if entry.file_type()?.is_dir() {
            if dest.exists() {
                fs::remove_dir_all(&dest)?;
            }
            copy_tree(&entry.path(), &dest, &mut report)?;
        } else if is_node_local(&name) {
            debug!(file = %entry.path().display(), "Skipping node-local file");
            report.skipped_files += 1;
        } else {
            fs::copy(entry.path(), &dest)?;
            report.copied_files += 1;
        }
    }

    info!(
        target,
        reference,
        copied_files = report.copied_files,
        copied_dirs = report.copied_dirs,
        skipped_files = report.skipped_files,
        "Node data recovered"
    );
    Ok(report)
}

fn copy_tree(src: &Path, dst: &Path, report: &mut RecoveryReport) -> NodeResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| NodeError::Recovery(e.to_string()))?;
        let dest = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
            report.copied_dirs += 1;
        } else if is_node_local(entry.file_name()) {
            debug!(file = %entry.path().display(), "Skipping node-local file");
            report.skipped_files += 1;
        } else {
            fs::copy(entry.path(), &dest)?;
            report.copied_files += 1;
        }
    }
    Ok(())
}

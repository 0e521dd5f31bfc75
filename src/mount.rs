/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Mount argument grammar (§6): `BRANCH:BRANCH`, where
//! `BRANCH := PATH["="("RO"|"RW")]`. Exactly one branch in a mount must
//! resolve to read-only and the other to read-write; when neither branch
//! names its mode the first is read-write and the second read-only, matching
//! the source's positional default.

use std::path::{Path, PathBuf};

use crate::attr::FileType;
use crate::error::{Error, Result};
use crate::vfs::UnderlyingFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone)]
pub struct MountSpec {
    pub ro_root: PathBuf,
    pub rw_root: PathBuf,
}

fn parse_branch(token: &str) -> Result<(PathBuf, Option<BranchMode>)> {
    if token.is_empty() {
        return Err(Error::Invalid("empty branch in mount argument".to_owned()));
    }
    match token.split_once('=') {
        None => Ok((PathBuf::from(token), None)),
        Some((path, mode)) => {
            if path.is_empty() {
                return Err(Error::Invalid(format!("branch '{token}' has no path")));
            }
            let mode = match mode.to_ascii_uppercase().as_str() {
                "RO" => BranchMode::ReadOnly,
                "RW" => BranchMode::ReadWrite,
                other => {
                    return Err(Error::Invalid(format!(
                        "branch '{token}' has unknown mode '{other}', expected RO or RW"
                    )))
                }
            };
            Ok((PathBuf::from(path), Some(mode)))
        }
    }
}

/// Parses the `BRANCH:BRANCH` mount argument into an ordered pair of roots.
pub fn parse_mount_spec(arg: &str) -> Result<MountSpec> {
    let parts: Vec<&str> = arg.split(':').collect();
    if parts.len() != 2 {
        return Err(Error::Invalid(format!(
            "mount argument '{arg}' must name exactly two branches, found {}",
            parts.len()
        )));
    }
    let (path_a, mode_a) = parse_branch(parts[0])?;
    let (path_b, mode_b) = parse_branch(parts[1])?;

    let (ro_root, rw_root) = match (mode_a, mode_b) {
        (None, None) => (path_b, path_a),
        (Some(BranchMode::ReadWrite), Some(BranchMode::ReadOnly)) => (path_b, path_a),
        (Some(BranchMode::ReadOnly), Some(BranchMode::ReadWrite)) => (path_a, path_b),
        (Some(BranchMode::ReadOnly), None) => (path_a, path_b),
        (Some(BranchMode::ReadWrite), None) => (path_b, path_a),
        (None, Some(BranchMode::ReadOnly)) => (path_b, path_a),
        (None, Some(BranchMode::ReadWrite)) => (path_a, path_b),
        (Some(a), Some(b)) if a == b => {
            return Err(Error::Invalid(format!(
                "mount argument '{arg}' names two branches with the same mode"
            )))
        }
        _ => unreachable!("all (Some, Some) combinations are covered above"),
    };

    Ok(MountSpec { ro_root, rw_root })
}

/// Eager mount-time branch validation, supplementing the grammar check: both
/// roots must exist and be directories before the union comes up, rather than
/// failing lazily on the first lookup (source's `hepunion_fill_super` bails
/// out the same way if either branch is missing).
pub fn validate_branches(fs: &dyn UnderlyingFs, spec: &MountSpec) -> Result<()> {
    require_directory(fs, &spec.ro_root, "read-only")?;
    require_directory(fs, &spec.rw_root, "read-write")?;
    if spec.ro_root == spec.rw_root {
        return Err(Error::Invalid(
            "read-only and read-write branches must be distinct paths".to_owned(),
        ));
    }
    Ok(())
}

fn require_directory(fs: &dyn UnderlyingFs, path: &Path, label: &str) -> Result<()> {
    let attr = fs.lstat(path).map_err(|e| {
        if e.is_not_found() {
            Error::Invalid(format!("{label} branch '{}' does not exist", path.display()))
        } else {
            e
        }
    })?;
    if attr.file_type != FileType::Directory {
        return Err(Error::Invalid(format!(
            "{label} branch '{}' is not a directory",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_first_is_rw() {
        let spec = parse_mount_spec("/rw:/ro").unwrap();
        assert_eq!(spec.rw_root, PathBuf::from("/rw"));
        assert_eq!(spec.ro_root, PathBuf::from("/ro"));
    }

    #[test]
    fn explicit_modes_any_order() {
        let spec = parse_mount_spec("/a=RO:/b=RW").unwrap();
        assert_eq!(spec.ro_root, PathBuf::from("/a"));
        assert_eq!(spec.rw_root, PathBuf::from("/b"));

        let spec = parse_mount_spec("/a=RW:/b=RO").unwrap();
        assert_eq!(spec.rw_root, PathBuf::from("/a"));
        assert_eq!(spec.ro_root, PathBuf::from("/b"));
    }

    #[test]
    fn one_explicit_one_default() {
        let spec = parse_mount_spec("/a=RO:/b").unwrap();
        assert_eq!(spec.ro_root, PathBuf::from("/a"));
        assert_eq!(spec.rw_root, PathBuf::from("/b"));
    }

    #[test]
    fn rejects_wrong_branch_count() {
        assert!(parse_mount_spec("/a").is_err());
        assert!(parse_mount_spec("/a:/b:/c").is_err());
    }

    #[test]
    fn rejects_duplicate_mode() {
        assert!(parse_mount_spec("/a=RO:/b=RO").is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(parse_mount_spec("/a=XX:/b").is_err());
    }
}

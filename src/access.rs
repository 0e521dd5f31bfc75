/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Access Gate (§4.7): POSIX permission checks against the merged `Attr`
//! (ME overlay already applied by the caller), plus `can_traverse`, which
//! walks every ancestor directory of a path checking execute permission —
//! the union's analogue of the kernel's own path-walk permission checks,
//! needed here because ME can override an RO directory's mode along the way.

use bitflags::bitflags;

use crate::attr::Attr;
use crate::error::{Error, Result};
use crate::lock::Elevation;
use crate::path::LogicalPath;
use crate::resolver::{FindFlags, Resolver};
use crate::vfs::UnderlyingFs;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u32 {
        const READ  = 0b100;
        const WRITE = 0b010;
        const EXEC  = 0b001;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// Checks `mode` against `attr` for `creds`, root always granted except for
/// "is this executable at all" on a regular file.
pub fn check(path: &LogicalPath, attr: &Attr, creds: &Credentials, mode: AccessMode) -> Result<()> {
    if creds.is_root() {
        if mode.contains(AccessMode::EXEC)
            && attr.file_type == crate::attr::FileType::Regular
            && attr.permission_bits() & 0o111 == 0
        {
            return Err(Error::Permission(path.clone()));
        }
        return Ok(());
    }

    let bits = attr.permission_bits();
    let shift = if attr.uid == creds.uid {
        6
    } else if attr.gid == creds.gid {
        3
    } else {
        0
    };
    let granted = (bits >> shift) & 0o7;
    if granted & mode.bits() == mode.bits() {
        Ok(())
    } else {
        Err(Error::Permission(path.clone()))
    }
}

/// Every ancestor directory of `path` must be executable by `creds`.
pub fn can_traverse(
    resolver: &Resolver,
    fs: &dyn UnderlyingFs,
    elevation: &Elevation,
    path: &LogicalPath,
    creds: &Credentials,
) -> Result<()> {
    for ancestor in path.ancestors() {
        let resolution = resolver.find_file(fs, elevation, &ancestor, FindFlags::MUST_READ_ONLY)?;
        let attr = fs.lstat(&resolution.concrete)?;
        check(&ancestor, &attr, creds, AccessMode::EXEC)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::FileType;
    use crate::path::DEFAULT_MAX_PATH_LEN;
    use std::time::SystemTime;

    fn attr(mode: u32, uid: u32, gid: u32) -> Attr {
        Attr {
            file_type: FileType::Regular,
            mode,
            uid,
            gid,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            size: 0,
            rdev: 0,
            ino: 0,
        }
    }

    #[test]
    fn owner_bits_apply_when_uid_matches() {
        let p = LogicalPath::new("/a", DEFAULT_MAX_PATH_LEN).unwrap();
        let a = attr(0o640, 1000, 1000);
        let creds = Credentials { uid: 1000, gid: 2000 };
        assert!(check(&p, &a, &creds, AccessMode::READ).is_ok());
        assert!(check(&p, &a, &creds, AccessMode::WRITE).is_ok());
        assert!(check(&p, &a, &creds, AccessMode::EXEC).is_err());
    }

    #[test]
    fn group_bits_apply_when_gid_matches_but_not_uid() {
        let p = LogicalPath::new("/a", DEFAULT_MAX_PATH_LEN).unwrap();
        let a = attr(0o640, 1000, 2000);
        let creds = Credentials { uid: 1001, gid: 2000 };
        assert!(check(&p, &a, &creds, AccessMode::READ).is_ok());
        assert!(check(&p, &a, &creds, AccessMode::WRITE).is_err());
    }

    #[test]
    fn other_bits_apply_otherwise() {
        let p = LogicalPath::new("/a", DEFAULT_MAX_PATH_LEN).unwrap();
        let a = attr(0o644, 1000, 2000);
        let creds = Credentials { uid: 1001, gid: 2001 };
        assert!(check(&p, &a, &creds, AccessMode::READ).is_ok());
        assert!(check(&p, &a, &creds, AccessMode::WRITE).is_err());
    }

    #[test]
    fn root_bypasses_everything_but_all_x_bits_clear() {
        let p = LogicalPath::new("/a", DEFAULT_MAX_PATH_LEN).unwrap();
        let a = attr(0o600, 1000, 2000);
        let root = Credentials { uid: 0, gid: 0 };
        assert!(check(&p, &a, &root, AccessMode::WRITE).is_ok());
        assert!(check(&p, &a, &root, AccessMode::EXEC).is_err());
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Copy-up Engine (§4.5): promotes an RO object to RW so it can be written.
//! Recursive for directories (every missing ancestor is copied up first) and
//! unwinds the concrete objects it created if a later step fails partway
//! through, so a failed copy-up never leaves a half-written object visible
//! on the RW branch.

use std::io::{Read, Write};
use std::path::Path;

use log::{debug, warn};

use crate::attr::{Attr, FileType};
use crate::error::Result;
use crate::lock::Elevation;
use crate::me::MetadataEngine;
use crate::path::LogicalPath;
use crate::translator::Translator;
use crate::vfs::{SetAttrFlags, UnderlyingFs};

pub struct CowEngine {
    translator: Translator,
    copy_buf_size: usize,
}

impl CowEngine {
    pub fn new(translator: Translator, copy_buf_size: usize) -> Self {
        CowEngine {
            translator,
            copy_buf_size,
        }
    }

    /// True if `path` is already RW-resident (copy-up is then a no-op).
    pub fn is_copied_up(&self, fs: &dyn UnderlyingFs, path: &LogicalPath) -> Result<bool> {
        Ok(fs.exists(&self.translator.make_rw(path)?))
    }

    /// Ensures `path` exists on the RW branch, recursively copying up any
    /// missing ancestor directories first. Once an object is copied up its
    /// ME sidecar (if any) is removed: the merged attributes now live on the
    /// RW object itself.
    pub fn copy_up(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        me: &MetadataEngine,
        path: &LogicalPath,
    ) -> Result<()> {
        let rw_path = self.translator.make_rw(path)?;
        if fs.exists(&rw_path) {
            return Ok(());
        }
        debug!("copy_up '{path}'");
        if !path.is_root() {
            let (parent, _) = path.split()?;
            self.copy_up(fs, elevation, me, &parent)?;
        }

        let ro_path = self.translator.make_ro(path)?;
        let mut attr = fs.lstat(&ro_path)?;
        if let Some(me_attr) = me.get_me(fs, path)? {
            attr.overlay_me(&me_attr);
        }

        let _guard = elevation.enter()?;
        if let Err(e) = self.create_matching(fs, &ro_path, &rw_path, &attr) {
            warn!("copy_up '{path}': create_matching failed ({e}), unwinding partial copy-up");
            self.unwind(fs, &rw_path, attr.file_type);
            return Err(e);
        }
        if let Err(e) = self.apply_attrs(fs, &rw_path, &attr) {
            warn!("copy_up '{path}': apply_attrs failed ({e}), unwinding partial copy-up");
            self.unwind(fs, &rw_path, attr.file_type);
            return Err(e);
        }
        me.remove_me(fs, elevation, path)?;
        Ok(())
    }

    fn create_matching(
        &self,
        fs: &dyn UnderlyingFs,
        ro_path: &Path,
        rw_path: &Path,
        attr: &Attr,
    ) -> Result<()> {
        match attr.file_type {
            FileType::Regular => self.copy_contents(fs, ro_path, rw_path),
            FileType::Directory => fs.mkdir(rw_path, attr.permission_bits()),
            FileType::Symlink => {
                let target = fs.readlink(ro_path)?;
                fs.symlink(&target, rw_path)
            }
            FileType::Fifo => fs.mkfifo(rw_path, attr.permission_bits()),
            FileType::CharDevice | FileType::BlockDevice | FileType::Socket => {
                fs.mknod(rw_path, attr.file_type, attr.permission_bits(), attr.rdev)
            }
        }
    }

    fn copy_contents(&self, fs: &dyn UnderlyingFs, ro_path: &Path, rw_path: &Path) -> Result<()> {
        let mut src = fs.open_read(ro_path)?;
        let mut dst = fs.create_new(rw_path, 0o600)?;
        let mut buf = vec![0u8; self.copy_buf_size];
        loop {
            // A negative return from the source's read() becomes an `Err`
            // here; zero means EOF; a short positive read just loops again.
            let n = src.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n])?;
        }
        Ok(())
    }

    fn apply_attrs(&self, fs: &dyn UnderlyingFs, rw_path: &Path, attr: &Attr) -> Result<()> {
        let mut flags = SetAttrFlags::UID | SetAttrFlags::GID | SetAttrFlags::ATIME | SetAttrFlags::MTIME;
        // Symlink permission bits are meaningless on POSIX; leave them alone.
        if attr.file_type != FileType::Symlink {
            flags |= SetAttrFlags::MODE;
        }
        fs.set_attr(rw_path, attr, flags)
    }

    /// Best-effort removal of whatever `create_matching` managed to create,
    /// on the path that just failed. Errors here are swallowed: we're
    /// already unwinding a failure and have nothing better to report.
    fn unwind(&self, fs: &dyn UnderlyingFs, rw_path: &Path, file_type: FileType) {
        let _ = match file_type {
            FileType::Directory => fs.rmdir(rw_path),
            _ => fs.unlink(rw_path),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::DEFAULT_MAX_PATH_LEN;
    use std::path::PathBuf;

    #[test]
    fn translator_roots_used_for_ro_rw_split() {
        // Exercises the pure path-arithmetic surface without touching a real
        // filesystem: copy_up's disk behavior is covered by the tempdir-based
        // integration tests.
        let translator = Translator::new(PathBuf::from("/ro"), PathBuf::from("/rw"), DEFAULT_MAX_PATH_LEN);
        let cow = CowEngine::new(translator.clone(), 4096);
        let p = LogicalPath::new("/a/b", DEFAULT_MAX_PATH_LEN).unwrap();
        assert_eq!(translator.make_ro(&p).unwrap(), PathBuf::from("/ro/a/b"));
        let _ = cow; // constructed to confirm the type composes
    }
}

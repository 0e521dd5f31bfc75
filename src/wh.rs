/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Whiteout Engine (§4.4): a `.wh.NAME` zero-length, mode-0400, root:root
//! file on the RW branch hides the RO name `NAME` from the union view.
//! Whiteouts only ever hide RO objects; an RW-resident object is removed
//! directly and needs no whiteout.

use std::path::Path;

use log::{debug, warn};

use crate::attr::mode::WHITEOUT_MODE;
use crate::error::Result;
use crate::lock::Elevation;
use crate::path::{self, LogicalPath, WH_PREFIX};
use crate::translator::Translator;
use crate::vfs::{SetAttrFlags, UnderlyingFs};

pub struct WhiteoutEngine {
    translator: Translator,
}

impl WhiteoutEngine {
    pub fn new(translator: Translator) -> Self {
        WhiteoutEngine { translator }
    }

    pub fn has_whiteout(&self, fs: &dyn UnderlyingFs, path: &LogicalPath) -> Result<bool> {
        let wh = self.translator.to_sidecar(path, WH_PREFIX)?;
        Ok(fs.exists(&wh))
    }

    /// Creates the whiteout for `path`, if it does not already exist.
    /// Idempotent: hiding an already-hidden name is not an error (§4.4).
    pub fn create_whiteout(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        path: &LogicalPath,
    ) -> Result<()> {
        debug!("create_whiteout '{path}'");
        let wh = self.translator.to_sidecar(path, WH_PREFIX)?;
        if fs.exists(&wh) {
            return Ok(());
        }
        let _guard = elevation.enter()?;
        fs.create_new(&wh, WHITEOUT_MODE)?;
        let root_owned = crate::attr::Attr {
            file_type: crate::attr::FileType::Regular,
            mode: WHITEOUT_MODE,
            uid: 0,
            gid: 0,
            atime: std::time::SystemTime::UNIX_EPOCH,
            mtime: std::time::SystemTime::UNIX_EPOCH,
            ctime: std::time::SystemTime::UNIX_EPOCH,
            size: 0,
            rdev: 0,
            ino: 0,
        };
        if let Err(e) = fs.set_attr(&wh, &root_owned, SetAttrFlags::UID | SetAttrFlags::GID) {
            warn!("create_whiteout '{path}': set_attr failed ({e}), unlinking partial whiteout");
            let _ = fs.unlink(&wh);
            return Err(e);
        }
        Ok(())
    }

    /// Invoked right after a new RW directory masks a same-named RO
    /// directory (§4.4, scenario S4): every non-special RO child gets a
    /// whiteout under the new RW directory so the overlay starts out
    /// logically empty instead of exposing the RO twin's contents.
    pub fn hide_directory_contents(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        path: &LogicalPath,
    ) -> Result<()> {
        let ro_path = self.translator.make_ro(path)?;
        if !fs.exists(&ro_path) {
            return Ok(());
        }
        for entry in fs.read_dir(&ro_path)? {
            if path::is_special(&entry.name) {
                continue;
            }
            self.create_whiteout(fs, elevation, &path.join(&entry.name))?;
        }
        Ok(())
    }

    /// Deletes every leftover `.wh.*` entry directly inside the RW-concrete
    /// directory `rw_dir` (`is_empty_dir`'s whiteout cleanup, §4.4): once the
    /// RO children they hid are confirmed gone from the merged view, the
    /// whiteouts themselves still physically occupy the directory and must
    /// be cleared before a real `rmdir()` on it can succeed.
    pub fn clear_whiteouts(&self, fs: &dyn UnderlyingFs, elevation: &Elevation, rw_dir: &Path) -> Result<()> {
        if !fs.exists(rw_dir) {
            return Ok(());
        }
        let _guard = elevation.enter()?;
        for entry in fs.read_dir(rw_dir)? {
            if path::is_whiteout(&entry.name) {
                fs.unlink(&rw_dir.join(&entry.name))?;
            }
        }
        Ok(())
    }

    /// Removes the whiteout for `path`, unhiding the RO object (§6 `unlink`
    /// on a whiteout, or re-creating a previously-deleted name).
    pub fn remove_whiteout(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        path: &LogicalPath,
    ) -> Result<()> {
        let wh = self.translator.to_sidecar(path, WH_PREFIX)?;
        if !fs.exists(&wh) {
            return Ok(());
        }
        let _guard = elevation.enter()?;
        fs.unlink(&wh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::DEFAULT_MAX_PATH_LEN;
    use std::path::PathBuf;

    #[test]
    fn whiteout_sidecar_path_uses_wh_prefix() {
        let translator = Translator::new(PathBuf::from("/ro"), PathBuf::from("/rw"), DEFAULT_MAX_PATH_LEN);
        let p = LogicalPath::new("/dir/name", DEFAULT_MAX_PATH_LEN).unwrap();
        assert_eq!(
            translator.to_sidecar(&p, WH_PREFIX).unwrap(),
            PathBuf::from("/rw/dir/.wh.name")
        );
    }
}

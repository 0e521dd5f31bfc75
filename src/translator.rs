/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Path Translator (§4.1): turns a logical path into a concrete RO or RW
//! path, and a logical path plus a reserved prefix into the sidecar path
//! (`.me.NAME` / `.wh.NAME`) that lives beside it on the RW branch.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::path::LogicalPath;

#[derive(Clone)]
pub struct Translator {
    ro_root: PathBuf,
    rw_root: PathBuf,
    max_concrete_len: usize,
}

impl Translator {
    pub fn new(ro_root: PathBuf, rw_root: PathBuf, max_concrete_len: usize) -> Self {
        Translator {
            ro_root,
            rw_root,
            max_concrete_len,
        }
    }

    pub fn ro_root(&self) -> &PathBuf {
        &self.ro_root
    }

    pub fn rw_root(&self) -> &PathBuf {
        &self.rw_root
    }

    /// The RO-branch concrete path for a logical path.
    pub fn make_ro(&self, path: &LogicalPath) -> Result<PathBuf> {
        self.concat(&self.ro_root, path)
    }

    /// The RW-branch concrete path for a logical path.
    pub fn make_rw(&self, path: &LogicalPath) -> Result<PathBuf> {
        self.concat(&self.rw_root, path)
    }

    fn concat(&self, root: &PathBuf, path: &LogicalPath) -> Result<PathBuf> {
        let logical = path.as_str().trim_start_matches('/');
        let mut out = root.clone();
        if !logical.is_empty() {
            out.push(logical);
        }
        if out.as_os_str().len() > self.max_concrete_len {
            return Err(Error::NameTooLong(path.clone()));
        }
        Ok(out)
    }

    /// The RW-branch sidecar path for `path` carrying the reserved `prefix`
    /// (`.me.` or `.wh.`), e.g. `/a/b` with `.wh.` becomes `RW/a/.wh.b`.
    /// Fails on the root, which has no parent to hold a sidecar.
    pub fn to_sidecar(&self, path: &LogicalPath, prefix: &str) -> Result<PathBuf> {
        let (parent, name) = path.split()?;
        let mut out = self.make_rw(&parent)?;
        out.push(format!("{prefix}{name}"));
        if out.as_os_str().len() > self.max_concrete_len {
            return Err(Error::NameTooLong(path.clone()));
        }
        Ok(out)
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Resolver (§4.2): `find_file` turns a logical path into the concrete
//! branch and path that should actually be touched, applying the whiteout
//! check first and copying up on demand for operations that intend to write.

use std::path::PathBuf;

use bitflags::bitflags;
use log::trace;

use crate::cow::CowEngine;
use crate::error::{Error, Result};
use crate::lock::Elevation;
use crate::me::MetadataEngine;
use crate::path::LogicalPath;
use crate::translator::Translator;
use crate::vfs::UnderlyingFs;
use crate::wh::WhiteoutEngine;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FindFlags: u8 {
        /// Caller only intends to read; an RO resolution is a normal result.
        const MUST_READ_ONLY  = 0b0001;
        /// Caller requires an RW-resident object and will not accept an RO
        /// fallback: if no RW twin exists, `find_file` fails immediately
        /// rather than resolving the RO object (e.g. `unlink`, `setattr`,
        /// which handle their own RO-branch logic after the call returns).
        const MUST_READ_WRITE = 0b0010;
        /// When resolution would otherwise be RO, copy the object up and
        /// return its new RW location instead. Independent of
        /// `MUST_READ_WRITE`: the two are never combined, since copy-up only
        /// ever triggers from within the "no RW twin" path.
        const CREATE_COPYUP   = 0b0100;
        /// Resolve past a whiteout as though it weren't there (used to
        /// recreate a name that a whiteout currently hides).
        const IGNORE_WHITEOUT = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Ro,
    Rw,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub branch: Branch,
    pub concrete: PathBuf,
}

pub struct Resolver {
    translator: Translator,
    wh: WhiteoutEngine,
    cow: CowEngine,
    me: MetadataEngine,
}

impl Resolver {
    pub fn new(translator: Translator, wh: WhiteoutEngine, cow: CowEngine, me: MetadataEngine) -> Self {
        Resolver { translator, wh, cow, me }
    }

    pub fn me(&self) -> &MetadataEngine {
        &self.me
    }

    pub fn wh(&self) -> &WhiteoutEngine {
        &self.wh
    }

    pub fn cow(&self) -> &CowEngine {
        &self.cow
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Resolves `path` to its concrete branch and location.
    pub fn find_file(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        path: &LogicalPath,
        flags: FindFlags,
    ) -> Result<Resolution> {
        if flags.contains(FindFlags::MUST_READ_ONLY) && flags.contains(FindFlags::MUST_READ_WRITE) {
            return Err(Error::Bug(
                "find_file called with both MUST_READ_ONLY and MUST_READ_WRITE".to_owned(),
            ));
        }

        if !flags.contains(FindFlags::IGNORE_WHITEOUT) && self.wh.has_whiteout(fs, path)? {
            trace!("find_file '{path}' -> WHITEOUTED");
            return Err(Error::NotFound(path.clone()));
        }

        let rw_path = self.translator.make_rw(path)?;
        if fs.exists(&rw_path) {
            trace!("find_file '{path}' -> READ_WRITE");
            return Ok(Resolution {
                branch: Branch::Rw,
                concrete: rw_path,
            });
        }

        if flags.contains(FindFlags::MUST_READ_WRITE) {
            trace!("find_file '{path}' -> NOT_FOUND (RW required, absent)");
            return Err(Error::NotFound(path.clone()));
        }

        let ro_path = self.translator.make_ro(path)?;
        if !fs.exists(&ro_path) {
            trace!("find_file '{path}' -> NOT_FOUND");
            return Err(Error::NotFound(path.clone()));
        }

        if flags.contains(FindFlags::CREATE_COPYUP) {
            trace!("find_file '{path}' -> READ_ONLY, triggering copy-up");
            self.cow.copy_up(fs, elevation, &self.me, path)?;
            let rw_path = self.translator.make_rw(path)?;
            return Ok(Resolution {
                branch: Branch::Rw,
                concrete: rw_path,
            });
        }

        trace!("find_file '{path}' -> READ_ONLY");
        Ok(Resolution {
            branch: Branch::Ro,
            concrete: ro_path,
        })
    }

    /// Ensures `path`'s parent directory exists on the RW branch (recursive
    /// copy-up of the parent only), returning the parent's logical path.
    /// Used before creating a new child, a whiteout, or a ME sidecar inside
    /// it.
    pub fn prepare_parent_for_write(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        path: &LogicalPath,
    ) -> Result<LogicalPath> {
        let (parent, _) = path.split()?;
        self.cow.copy_up(fs, elevation, &self.me, &parent)?;
        Ok(parent)
    }
}

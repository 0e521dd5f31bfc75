/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The union filesystem's operation table (§6): lookup, create, mkdir,
//! mknod, mkfifo, symlink, link, unlink, rmdir, setattr, getattr, open,
//! readdir, and statfs, each built from the engines in this crate rather
//! than duplicating their logic.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use crate::access::{self, AccessMode, Credentials};
use crate::attr::{Attr, FileType};
use crate::cow::CowEngine;
use crate::error::{Error, Result};
use crate::hash::name_to_ino;
use crate::lock::Elevation;
use crate::me::MetadataEngine;
use crate::mount::MountSpec;
use crate::path::LogicalPath;
use crate::readdir::ReaddirMerger;
use crate::resolver::{Branch, FindFlags, Resolution, Resolver};
use crate::translator::Translator;
use crate::vfs::{DirEntryInfo, SetAttrFlags, StatFs, UnderlyingFs};
use crate::wh::WhiteoutEngine;

/// `statfs.f_type` stamp (§6, §10.7): a fixed constant identifying the union,
/// not derived from `ino_seed` — kept numerically equal to the source's
/// `HEPUNION_MAGIC` so the value has the same provenance as the algorithm it
/// accompanies.
const UNION_MAGIC: u64 = 0x9_F510;

pub struct UnionFs {
    fs: Box<dyn UnderlyingFs>,
    resolver: Resolver,
    readdir: ReaddirMerger,
    elevation: Elevation,
    ino_seed: u64,
}

impl UnionFs {
    pub fn new(
        fs: Box<dyn UnderlyingFs>,
        mount: MountSpec,
        max_path_len: usize,
        ino_seed: u64,
        copy_buf_size: usize,
    ) -> Result<Self> {
        crate::mount::validate_branches(fs.as_ref(), &mount)?;
        let translator = Translator::new(mount.ro_root, mount.rw_root, max_path_len);
        let me = MetadataEngine::new(translator.clone());
        let wh = WhiteoutEngine::new(translator.clone());
        let cow = CowEngine::new(translator.clone(), copy_buf_size);
        let resolver = Resolver::new(translator.clone(), wh, cow, me);
        let readdir = ReaddirMerger::new(translator);
        Ok(UnionFs {
            fs,
            resolver,
            readdir,
            elevation: Elevation::new(),
            ino_seed,
        })
    }

    /// Merges the underlying object's attributes with any ME override and
    /// replaces the branch-native inode with the synthesized `hash(path)`
    /// (§3, §6: "returned inode carries hash(logical path)").
    fn resolved_attr(&self, resolution: &Resolution, path: &LogicalPath) -> Result<Attr> {
        let mut attr = self.fs.lstat(&resolution.concrete)?;
        if resolution.branch == Branch::Ro {
            if let Some(me) = self.resolver.me().get_me(self.fs.as_ref(), path)? {
                attr.overlay_me(&me);
            }
        }
        attr.ino = name_to_ino(path, self.ino_seed);
        Ok(attr)
    }

    fn authorize_path(&self, creds: &Credentials, path: &LogicalPath) -> Result<()> {
        access::can_traverse(&self.resolver, self.fs.as_ref(), &self.elevation, path, creds)
    }

    /// §6 `lookup`/`getattr`: resolves `path` and returns its merged attrs.
    pub fn getattr(&self, creds: &Credentials, path: &LogicalPath) -> Result<Attr> {
        self.authorize_path(creds, path)?;
        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::MUST_READ_ONLY)?;
        self.resolved_attr(&resolution, path)
    }

    fn reject_if_exists(&self, path: &LogicalPath) -> Result<()> {
        match self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::MUST_READ_ONLY)
        {
            Ok(_) => Err(Error::Exists(path.clone())),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create_object(
        &self,
        creds: &Credentials,
        path: &LogicalPath,
        build: impl FnOnce(&dyn UnderlyingFs, &std::path::Path) -> Result<()>,
    ) -> Result<Attr> {
        let (parent, _) = path.split()?;
        self.authorize_path(creds, &parent)?;
        access::check(&parent, &self.getattr(creds, &parent)?, creds, AccessMode::WRITE)?;
        self.reject_if_exists(path)?;

        self.resolver
            .prepare_parent_for_write(self.fs.as_ref(), &self.elevation, path)?;
        self.resolver
            .wh()
            .remove_whiteout(self.fs.as_ref(), &self.elevation, path)?;

        let rw_path = self.resolver.translator().make_rw(path)?;
        let _guard = self.elevation.enter()?;
        build(self.fs.as_ref(), &rw_path)?;

        let resolution = Resolution {
            branch: Branch::Rw,
            concrete: rw_path,
        };
        self.resolved_attr(&resolution, path)
    }

    pub fn create(&self, creds: &Credentials, path: &LogicalPath, mode: u32) -> Result<Attr> {
        self.create_object(creds, path, |fs, rw_path| {
            fs.create_new(rw_path, mode)?;
            Ok(())
        })
    }

    /// §6 `mkdir`: if an RO directory already resolves at `path`, the new RW
    /// directory overlays it instead of failing `EXISTS`; every RO child is
    /// then whiteouted so the overlay starts out logically empty (§4.4
    /// `hide_directory_contents`, scenario S4). Any other existing
    /// resolution (RW-resident, or an RO non-directory) is a genuine
    /// `EXISTS`, matching plain POSIX `mkdir(2)`.
    pub fn mkdir(&self, creds: &Credentials, path: &LogicalPath, mode: u32) -> Result<Attr> {
        let (parent, _) = path.split()?;
        self.authorize_path(creds, &parent)?;
        access::check(&parent, &self.getattr(creds, &parent)?, creds, AccessMode::WRITE)?;

        let masks_ro_dir = match self.resolver.find_file(
            self.fs.as_ref(),
            &self.elevation,
            path,
            FindFlags::MUST_READ_ONLY,
        ) {
            Ok(resolution) => {
                let attr = self.resolved_attr(&resolution, path)?;
                if resolution.branch == Branch::Rw || attr.file_type != FileType::Directory {
                    return Err(Error::Exists(path.clone()));
                }
                true
            }
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        self.resolver
            .prepare_parent_for_write(self.fs.as_ref(), &self.elevation, path)?;
        self.resolver
            .wh()
            .remove_whiteout(self.fs.as_ref(), &self.elevation, path)?;

        let rw_path = self.resolver.translator().make_rw(path)?;
        {
            let _guard = self.elevation.enter()?;
            self.fs.mkdir(&rw_path, mode)?;
        }
        if masks_ro_dir {
            self.resolver
                .wh()
                .hide_directory_contents(self.fs.as_ref(), &self.elevation, path)?;
        }

        let resolution = Resolution {
            branch: Branch::Rw,
            concrete: rw_path,
        };
        self.resolved_attr(&resolution, path)
    }

    pub fn mkfifo(&self, creds: &Credentials, path: &LogicalPath, mode: u32) -> Result<Attr> {
        self.create_object(creds, path, |fs, rw_path| fs.mkfifo(rw_path, mode))
    }

    pub fn mknod(
        &self,
        creds: &Credentials,
        path: &LogicalPath,
        file_type: FileType,
        mode: u32,
        rdev: u64,
    ) -> Result<Attr> {
        self.create_object(creds, path, move |fs, rw_path| {
            fs.mknod(rw_path, file_type, mode, rdev)
        })
    }

    pub fn symlink(&self, creds: &Credentials, path: &LogicalPath, target: &std::path::Path) -> Result<Attr> {
        self.create_object(creds, path, move |fs, rw_path| fs.symlink(target, rw_path))
    }

    /// §6 `link`: both `old_path` and `new_path` must resolve to the RW
    /// branch, since a hard link cannot cross the RO/RW boundary (an RO
    /// inode has no writable link count to bump).
    pub fn link(&self, creds: &Credentials, old_path: &LogicalPath, new_path: &LogicalPath) -> Result<Attr> {
        self.authorize_path(creds, old_path)?;
        self.reject_if_exists(new_path)?;
        self.resolver
            .cow()
            .copy_up(self.fs.as_ref(), &self.elevation, self.resolver.me(), old_path)?;
        self.resolver
            .prepare_parent_for_write(self.fs.as_ref(), &self.elevation, new_path)?;
        self.resolver
            .wh()
            .remove_whiteout(self.fs.as_ref(), &self.elevation, new_path)?;

        let old_rw = self.resolver.translator().make_rw(old_path)?;
        let new_rw = self.resolver.translator().make_rw(new_path)?;
        let _guard = self.elevation.enter()?;
        self.fs.link(&old_rw, &new_rw)?;

        let resolution = Resolution {
            branch: Branch::Rw,
            concrete: new_rw,
        };
        self.resolved_attr(&resolution, new_path)
    }

    /// §6 `unlink`: an RW-resident object is removed directly; an RO-only
    /// object is hidden behind a whiteout instead (§4.4).
    pub fn unlink(&self, creds: &Credentials, path: &LogicalPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::Permission(path.clone()));
        }
        let (parent, _) = path.split()?;
        self.authorize_path(creds, &parent)?;
        access::check(&parent, &self.getattr(creds, &parent)?, creds, AccessMode::WRITE)?;

        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::empty())?;
        match resolution.branch {
            Branch::Rw => {
                let _guard = self.elevation.enter()?;
                self.fs.unlink(&resolution.concrete)?;
                self.resolver
                    .me()
                    .remove_me(self.fs.as_ref(), &self.elevation, path)?;
                Ok(())
            }
            Branch::Ro => {
                self.resolver
                    .prepare_parent_for_write(self.fs.as_ref(), &self.elevation, path)?;
                self.resolver
                    .wh()
                    .create_whiteout(self.fs.as_ref(), &self.elevation, path)?;
                self.resolver
                    .me()
                    .remove_me(self.fs.as_ref(), &self.elevation, path)
            }
        }
    }

    /// §6 `rmdir`: like `unlink` but additionally requires the directory be
    /// empty in the merged view, and (unlike `unlink`) removes an RW-resident
    /// object via `rmdir()` rather than `unlink()`. A directory that masks a
    /// same-named RO twin (§4.4 scenario S4) gets a whiteout of its own
    /// before the RW directory is removed, so the RO twin stays hidden
    /// afterwards instead of reappearing; any `.wh.*` entries left over from
    /// already-deleted RO children are cleaned up first so the concrete
    /// directory is actually empty when the real `rmdir()` runs.
    pub fn rmdir(&self, creds: &Credentials, path: &LogicalPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::Permission(path.clone()));
        }
        let (parent, _) = path.split()?;
        self.authorize_path(creds, &parent)?;
        access::check(&parent, &self.getattr(creds, &parent)?, creds, AccessMode::WRITE)?;

        let entries = self.readdir(creds, path)?;
        if !entries.is_empty() {
            return Err(Error::NotEmpty(path.clone()));
        }

        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::empty())?;
        match resolution.branch {
            Branch::Rw => {
                let ro_path = self.resolver.translator().make_ro(path)?;
                let has_ro = self.fs.exists(&ro_path);

                self.resolver
                    .wh()
                    .clear_whiteouts(self.fs.as_ref(), &self.elevation, &resolution.concrete)?;
                if has_ro {
                    self.resolver
                        .wh()
                        .create_whiteout(self.fs.as_ref(), &self.elevation, path)?;
                }
                let rmdir_result = {
                    let _guard = self.elevation.enter()?;
                    self.fs.rmdir(&resolution.concrete)
                };
                if let Err(e) = rmdir_result {
                    if has_ro {
                        let _ = self.resolver.wh().remove_whiteout(self.fs.as_ref(), &self.elevation, path);
                    }
                    return Err(e);
                }
                self.resolver
                    .me()
                    .remove_me(self.fs.as_ref(), &self.elevation, path)?;
                Ok(())
            }
            Branch::Ro => {
                self.resolver
                    .prepare_parent_for_write(self.fs.as_ref(), &self.elevation, path)?;
                self.resolver
                    .wh()
                    .create_whiteout(self.fs.as_ref(), &self.elevation, path)?;
                self.resolver
                    .me()
                    .remove_me(self.fs.as_ref(), &self.elevation, path)
            }
        }
    }

    /// §6 `setattr`: copies the object up before mutating it, unless the
    /// object is still RO, in which case the change is captured in its ME
    /// sidecar instead of forcing a full data copy.
    pub fn setattr(
        &self,
        creds: &Credentials,
        path: &LogicalPath,
        new_attr: &Attr,
        fields: crate::me::MeFields,
    ) -> Result<Attr> {
        self.authorize_path(creds, path)?;
        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::empty())?;

        match resolution.branch {
            Branch::Rw => {
                let mut flags = SetAttrFlags::empty();
                if fields.contains(crate::me::MeFields::OWNER) {
                    flags |= SetAttrFlags::UID | SetAttrFlags::GID;
                }
                if fields.contains(crate::me::MeFields::MODE) {
                    flags |= SetAttrFlags::MODE;
                }
                if fields.contains(crate::me::MeFields::TIME) {
                    flags |= SetAttrFlags::ATIME | SetAttrFlags::MTIME;
                }
                let _guard = self.elevation.enter()?;
                self.fs.set_attr(&resolution.concrete, new_attr, flags)?;
            }
            Branch::Ro => {
                let concrete_attr = self.fs.lstat(&resolution.concrete)?;
                self.resolver.me().set_me(
                    self.fs.as_ref(),
                    &self.elevation,
                    path,
                    &concrete_attr,
                    new_attr,
                    fields,
                )?;
            }
        }
        self.getattr(creds, path)
    }

    /// §6 `open` for reading: no copy-up, works against whichever branch the
    /// object currently resolves to.
    pub fn open_for_read(&self, creds: &Credentials, path: &LogicalPath) -> Result<File> {
        self.authorize_path(creds, path)?;
        let attr = self.getattr(creds, path)?;
        access::check(path, &attr, creds, AccessMode::READ)?;
        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::MUST_READ_ONLY)?;
        self.fs.open_read(&resolution.concrete)
    }

    /// §6 `open` for writing: forces copy-up so the returned handle always
    /// points at the RW branch.
    pub fn open_for_write(&self, creds: &Credentials, path: &LogicalPath, truncate: bool) -> Result<File> {
        self.authorize_path(creds, path)?;
        let attr = self.getattr(creds, path)?;
        access::check(path, &attr, creds, AccessMode::WRITE)?;
        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::CREATE_COPYUP)?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(truncate)
            .open(&resolution.concrete)?;
        if truncate {
            file.seek(SeekFrom::Start(0))?;
        }
        Ok(file)
    }

    /// Forces an RO-resident object up to the RW branch without opening it,
    /// for callers that just want the copy-up side effect (e.g. the `cp-up`
    /// CLI subcommand).
    pub fn cp_up(&self, creds: &Credentials, path: &LogicalPath) -> Result<Attr> {
        self.authorize_path(creds, path)?;
        let attr = self.getattr(creds, path)?;
        access::check(path, &attr, creds, AccessMode::WRITE)?;
        let resolution = self
            .resolver
            .find_file(self.fs.as_ref(), &self.elevation, path, FindFlags::CREATE_COPYUP)?;
        self.resolved_attr(&resolution, path)
    }

    pub fn readdir(&self, creds: &Credentials, path: &LogicalPath) -> Result<Vec<DirEntryInfo>> {
        self.authorize_path(creds, path)?;
        let attr = self.getattr(creds, path)?;
        access::check(path, &attr, creds, AccessMode::READ)?;
        self.readdir.readdir(self.fs.as_ref(), path, self.ino_seed)
    }

    /// §6 `statfs`: the RO branch's own `statvfs`, restamped with the
    /// union's own `f_type` (a fixed magic, not derived from the seed) and
    /// `f_fsid` (`ino_seed` itself; the source packs the same 64-bit seed
    /// into `f_fsid`'s two 32-bit halves, which this trait's `u64` field
    /// represents directly), matching `hepunion_statfs`'s "mark our stuff"
    /// step.
    pub fn statfs(&self) -> Result<StatFs> {
        let mut stat = self.fs.statfs(self.resolver.translator().ro_root())?;
        stat.f_type = UNION_MAGIC;
        stat.f_fsid = self.ino_seed;
        Ok(stat)
    }
}

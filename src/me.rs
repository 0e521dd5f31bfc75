/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Metadata Engine (§4.3): a `.me.NAME` sidecar on the RW branch carries
//! owner/mode/atime/mtime/ctime overrides for an RO object without copying
//! its data. The sidecar's own inode metadata *is* the storage: its mode
//! bits (masked to `VALID_MODES_MASK`), uid/gid, and times are the override.
//! Decoupled from copy-up: an object can gain a ME without ever being
//! promoted to RW, and a promoted (RW-resident) object no longer consults
//! its ME (§4.3's "copy-up subsumes ME").

use bitflags::bitflags;
use log::debug;

use crate::attr::{mode::S_IRUSR, Attr, VALID_MODES_MASK};
use crate::error::Result;
use crate::lock::Elevation;
use crate::path::{LogicalPath, ME_PREFIX};
use crate::translator::Translator;
use crate::vfs::{SetAttrFlags, UnderlyingFs};

bitflags! {
    /// Which dimensions of `set_me` should be written, mirroring §4.3's
    /// owner/mode/time independence (a `chmod` alone must not disturb owner).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MeFields: u8 {
        const OWNER = 0b001;
        const MODE  = 0b010;
        const TIME  = 0b100;
    }
}

const ME_INITIAL_MODE: u32 = S_IRUSR | 0o200; // rw for owner only until set_me narrows it

pub struct MetadataEngine {
    translator: Translator,
}

impl MetadataEngine {
    pub fn new(translator: Translator) -> Self {
        MetadataEngine { translator }
    }

    /// Reads the ME sidecar for `path`, if one exists. The returned `Attr`'s
    /// `file_type` field is meaningless (the sidecar is always a regular
    /// file) and must be combined with the underlying object's own type via
    /// [`Attr::overlay_me`].
    pub fn get_me(&self, fs: &dyn UnderlyingFs, path: &LogicalPath) -> Result<Option<Attr>> {
        let sidecar = self.translator.to_sidecar(path, ME_PREFIX)?;
        if !fs.exists(&sidecar) {
            return Ok(None);
        }
        Ok(Some(fs.lstat(&sidecar)?))
    }

    pub fn has_me(&self, fs: &dyn UnderlyingFs, path: &LogicalPath) -> Result<bool> {
        Ok(self.translator.to_sidecar(path, ME_PREFIX).map(|s| fs.exists(&s))?)
    }

    /// Creates or updates the ME sidecar so that its stored attributes equal
    /// `attr` for the dimensions named in `fields`. When the sidecar does not
    /// exist yet, every dimension NOT named in `fields` is seeded from
    /// `concrete_attr` (the real object's current attributes) instead of
    /// being left at whatever the sidecar's creation happened to produce —
    /// otherwise setting one dimension alone (e.g. `chmod`) would silently
    /// reset the others (owner, times) on first write.
    pub fn set_me(
        &self,
        fs: &dyn UnderlyingFs,
        elevation: &Elevation,
        path: &LogicalPath,
        concrete_attr: &Attr,
        attr: &Attr,
        fields: MeFields,
    ) -> Result<()> {
        debug!("set_me '{path}' fields={fields:?}");
        let sidecar = self.translator.to_sidecar(path, ME_PREFIX)?;
        let _guard = elevation.enter()?;
        let is_new = !fs.exists(&sidecar);
        if is_new {
            fs.create_new(&sidecar, ME_INITIAL_MODE)?;
        }

        // On a fresh sidecar, every dimension not explicitly requested is
        // still written, seeded from the concrete object rather than left at
        // the sidecar's own just-created attributes.
        let seed_fields = if is_new { MeFields::all() - fields } else { MeFields::empty() };
        let write_fields = fields | seed_fields;

        let mut vfs_flags = SetAttrFlags::empty();
        if write_fields.contains(MeFields::OWNER) {
            vfs_flags |= SetAttrFlags::UID | SetAttrFlags::GID;
        }
        if write_fields.contains(MeFields::MODE) {
            vfs_flags |= SetAttrFlags::MODE;
        }
        if write_fields.contains(MeFields::TIME) {
            vfs_flags |= SetAttrFlags::ATIME | SetAttrFlags::MTIME;
        }
        if vfs_flags.is_empty() {
            return Ok(());
        }

        let mut stored = *attr;
        if seed_fields.contains(MeFields::OWNER) {
            stored.uid = concrete_attr.uid;
            stored.gid = concrete_attr.gid;
        }
        if seed_fields.contains(MeFields::MODE) {
            stored.mode = concrete_attr.mode;
        }
        if seed_fields.contains(MeFields::TIME) {
            stored.atime = concrete_attr.atime;
            stored.mtime = concrete_attr.mtime;
        }
        stored.mode &= VALID_MODES_MASK;
        fs.set_attr(&sidecar, &stored, vfs_flags)
    }

    /// Removes the ME sidecar, if any. Called when an object is deleted or
    /// copied up (copy-up carries the merged attributes onto the RW object
    /// itself, so the sidecar becomes redundant).
    pub fn remove_me(&self, fs: &dyn UnderlyingFs, elevation: &Elevation, path: &LogicalPath) -> Result<()> {
        let sidecar = self.translator.to_sidecar(path, ME_PREFIX)?;
        if !fs.exists(&sidecar) {
            return Ok(());
        }
        debug!("remove_me '{path}'");
        let _guard = elevation.enter()?;
        fs.unlink(&sidecar)
    }
}

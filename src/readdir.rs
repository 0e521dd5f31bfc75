/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Readdir Merger (§4.6): combines the RW and RO listings of a directory
//! into one logical view. An RW entry shadows an RO entry of the same name;
//! a `.wh.NAME` entry on RW hides `NAME` from the RO listing; `.me.NAME` and
//! `.wh.NAME` sidecars themselves are never exposed.

use std::collections::HashSet;

use crate::error::Result;
use crate::hash::name_to_ino;
use crate::path::{self, LogicalPath, WH_PREFIX};
use crate::translator::Translator;
use crate::vfs::{DirEntryInfo, UnderlyingFs};

pub struct ReaddirMerger {
    translator: Translator,
}

impl ReaddirMerger {
    pub fn new(translator: Translator) -> Self {
        ReaddirMerger { translator }
    }

    /// `ino_seed` mirrors the mount magic used to seed `name_to_ino` (§3,
    /// §4.6): each listed entry's inode number is the hash of its own
    /// logical path, not whatever the branch's raw directory entry carried.
    pub fn readdir(&self, fs: &dyn UnderlyingFs, path: &LogicalPath, ino_seed: u64) -> Result<Vec<DirEntryInfo>> {
        let rw_path = self.translator.make_rw(path)?;
        let ro_path = self.translator.make_ro(path)?;

        let mut whiteouts: HashSet<String> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        if fs.exists(&rw_path) {
            for mut entry in fs.read_dir(&rw_path)? {
                if path::is_special(&entry.name) {
                    continue;
                }
                if path::is_whiteout(&entry.name) {
                    whiteouts.insert(entry.name[WH_PREFIX.len()..].to_owned());
                    continue;
                }
                if path::is_me(&entry.name) {
                    continue;
                }
                entry.ino = name_to_ino(&path.join(&entry.name), ino_seed);
                seen.insert(entry.name.clone());
                out.push(entry);
            }
        }

        if fs.exists(&ro_path) {
            for mut entry in fs.read_dir(&ro_path)? {
                if path::is_special(&entry.name) {
                    continue;
                }
                if seen.contains(&entry.name) || whiteouts.contains(&entry.name) {
                    continue;
                }
                entry.ino = name_to_ino(&path.join(&entry.name), ino_seed);
                out.push(entry);
            }
        }

        Ok(out)
    }
}

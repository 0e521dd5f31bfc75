/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A userspace union filesystem core: an RO branch and an RW branch merged
//! into one logical namespace, with copy-on-write promotion, sidecar
//! metadata overrides, and whiteouts standing in for deletions of RO
//! objects. See `SPEC_FULL.md` at the repository root for the full module
//! breakdown this crate implements.

pub mod access;
pub mod attr;
pub mod config;
pub mod cow;
pub mod error;
pub mod hash;
pub mod lock;
pub mod me;
pub mod mount;
pub mod ops;
pub mod path;
pub mod readdir;
pub mod resolver;
pub mod translator;
pub mod vfs;
pub mod wh;

pub use error::{Error, Result};
pub use ops::UnionFs;

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The narrow seam between the union filesystem core and the real operating
//! system (§9: "Express the underlying-FS dependency as a narrow trait ...
//! with one implementation per host", replacing the source's dual-kernel-ABI
//! conditional compilation). Engines in this crate only ever reach the real
//! filesystem through `UnderlyingFs`, which keeps the unwind/retry paths of
//! COW and WH testable against a fake implementation.

use std::fs::File;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::attr::{Attr, FileType};
use crate::error::Result;

bitflags! {
    /// Which attribute dimensions a `set_attr` call should apply, mirroring
    /// the source's `iattr.ia_valid` bitmask (§4.3, §4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SetAttrFlags: u8 {
        const MODE  = 0b0000_0001;
        const UID   = 0b0000_0010;
        const GID   = 0b0000_0100;
        const ATIME = 0b0000_1000;
        const MTIME = 0b0001_0000;
    }
}

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub file_type: FileType,
    /// Synthesized inode number (§4.6: "the child's synthesized inode
    /// number"). Branch-level readers (`RealFs::read_dir`) don't know the
    /// entry's logical path and leave this `0`; `ReaddirMerger` fills it in.
    pub ino: u64,
}

/// Filesystem-level statistics (§6 `statfs`: forwards the RO branch's own
/// `statvfs`, then stamps `f_type`/`f_fsid` as the union's own rather than
/// the RO branch's, matching `hepunion_statfs`). `RealFs::statfs` only fills
/// the branch-native fields; `UnionFs::statfs` fills `f_type`/`f_fsid`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatFs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub max_name_len: u64,
    pub f_type: u64,
    pub f_fsid: u64,
}

/// The underlying-FS dependency, narrowed to exactly what the core engines
/// call. One real implementation (`RealFs`) and, in tests, a recording/faulty
/// stand-in that exercises the unwind paths of I4/I5 without touching disk.
pub trait UnderlyingFs: Send + Sync {
    /// Like `lstat`: does not follow a trailing symlink.
    fn lstat(&self, path: &Path) -> Result<Attr>;

    /// A cheap existence probe (§4.2: "probes are per-component path lookups,
    /// not full stat"). Does not distinguish error kinds other than "absent".
    fn exists(&self, path: &Path) -> bool;

    fn open_read(&self, path: &Path) -> Result<File>;

    /// `open(CREATE|WRONLY|EXCLUSIVE, mode)`.
    fn create_new(&self, path: &Path, mode: u32) -> Result<File>;

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()>;
    fn rmdir(&self, path: &Path) -> Result<()>;
    fn unlink(&self, path: &Path) -> Result<()>;

    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    fn readlink(&self, path: &Path) -> Result<PathBuf>;

    fn mknod(&self, path: &Path, file_type: FileType, mode: u32, rdev: u64) -> Result<()>;
    fn mkfifo(&self, path: &Path, mode: u32) -> Result<()>;
    fn link(&self, old: &Path, new: &Path) -> Result<()>;

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;

    fn set_attr(&self, path: &Path, attr: &Attr, flags: SetAttrFlags) -> Result<()>;

    fn statfs(&self, path: &Path) -> Result<StatFs>;
}

#[cfg(unix)]
pub use unix::RealFs;

#[cfg(unix)]
mod unix {
    use std::fs::{self, File, OpenOptions};
    use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use nix::sys::stat::{mknod as nix_mknod, Mode as NixMode, SFlag};
    use nix::sys::time::TimeSpec;
    use nix::unistd::{fchownat, mkfifo as nix_mkfifo, FchownatFlags, Gid, Uid};

    use super::{DirEntryInfo, SetAttrFlags, StatFs, UnderlyingFs};
    use crate::attr::Attr;
    use crate::attr::FileType;
    use crate::error::{Error, Result};

    /// The only implementation shipped: real POSIX filesystem access via
    /// `std::fs` plus `nix`/`libc` for the calls `std::fs` doesn't expose
    /// (device nodes, FIFOs, owner/time changes that must not follow a
    /// trailing symlink).
    #[derive(Debug, Default, Clone, Copy)]
    pub struct RealFs;

    fn file_type_of(ft: fs::FileType) -> FileType {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_fifo() {
            FileType::Fifo
        } else if ft.is_char_device() {
            FileType::CharDevice
        } else if ft.is_block_device() {
            FileType::BlockDevice
        } else if ft.is_socket() {
            FileType::Socket
        } else {
            FileType::Regular
        }
    }

    fn system_time_from(secs: i64, nsecs: i64) -> SystemTime {
        if secs >= 0 {
            UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
        } else {
            UNIX_EPOCH - Duration::new((-secs) as u64, 0)
        }
    }

    fn to_attr(meta: &fs::Metadata) -> Attr {
        Attr {
            file_type: file_type_of(meta.file_type()),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            atime: system_time_from(meta.atime(), meta.atime_nsec()),
            mtime: system_time_from(meta.mtime(), meta.mtime_nsec()),
            ctime: system_time_from(meta.ctime(), meta.ctime_nsec()),
            size: meta.len(),
            rdev: meta.rdev(),
            // The branch's own inode; `UnionFs` replaces this with the
            // synthesized hash(logical path) once it knows which logical
            // path these attrs resolve to (§3, §6).
            ino: meta.ino(),
        }
    }

    impl UnderlyingFs for RealFs {
        fn lstat(&self, path: &Path) -> Result<Attr> {
            Ok(to_attr(&fs::symlink_metadata(path)?))
        }

        fn exists(&self, path: &Path) -> bool {
            fs::symlink_metadata(path).is_ok()
        }

        fn open_read(&self, path: &Path) -> Result<File> {
            Ok(File::open(path)?)
        }

        fn create_new(&self, path: &Path, mode: u32) -> Result<File> {
            Ok(OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(mode)
                .open(path)?)
        }

        fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
            fs::create_dir(path)?;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
            Ok(())
        }

        fn rmdir(&self, path: &Path) -> Result<()> {
            Ok(fs::remove_dir(path)?)
        }

        fn unlink(&self, path: &Path) -> Result<()> {
            Ok(fs::remove_file(path)?)
        }

        fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
            Ok(std::os::unix::fs::symlink(target, link)?)
        }

        fn readlink(&self, path: &Path) -> Result<PathBuf> {
            Ok(fs::read_link(path)?)
        }

        fn mknod(&self, path: &Path, file_type: FileType, mode: u32, rdev: u64) -> Result<()> {
            let kind = match file_type {
                FileType::CharDevice => SFlag::S_IFCHR,
                FileType::BlockDevice => SFlag::S_IFBLK,
                FileType::Socket => SFlag::S_IFSOCK,
                _ => {
                    return Err(Error::Bug(format!(
                        "mknod called with non-device file type {file_type:?}"
                    )))
                }
            };
            let mode = NixMode::from_bits_truncate(mode);
            nix_mknod(path, kind, mode, rdev).map_err(|e| Error::Io(e.into()))?;
            Ok(())
        }

        fn mkfifo(&self, path: &Path, mode: u32) -> Result<()> {
            let mode = NixMode::from_bits_truncate(mode);
            nix_mkfifo(path, mode).map_err(|e| Error::Io(e.into()))?;
            Ok(())
        }

        fn link(&self, old: &Path, new: &Path) -> Result<()> {
            Ok(fs::hard_link(old, new)?)
        }

        fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
            let mut out = Vec::new();
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = file_type_of(entry.file_type()?);
                out.push(DirEntryInfo { name, file_type, ino: 0 });
            }
            Ok(out)
        }

        fn set_attr(&self, path: &Path, attr: &Attr, flags: SetAttrFlags) -> Result<()> {
            if flags.contains(SetAttrFlags::MODE) {
                fs::set_permissions(path, fs::Permissions::from_mode(attr.mode))?;
            }
            if flags.contains(SetAttrFlags::UID) || flags.contains(SetAttrFlags::GID) {
                let uid = flags
                    .contains(SetAttrFlags::UID)
                    .then(|| Uid::from_raw(attr.uid));
                let gid = flags
                    .contains(SetAttrFlags::GID)
                    .then(|| Gid::from_raw(attr.gid));
                fchownat(None, path, uid, gid, FchownatFlags::NoFollowSymlink)
                    .map_err(|e| Error::Io(e.into()))?;
            }
            if flags.contains(SetAttrFlags::ATIME) || flags.contains(SetAttrFlags::MTIME) {
                let atime = to_timespec(attr.atime);
                let mtime = to_timespec(attr.mtime);
                nix::sys::stat::utimensat(
                    None,
                    path,
                    &atime,
                    &mtime,
                    nix::sys::stat::UtimensatFlags::NoFollowSymlink,
                )
                .map_err(|e| Error::Io(e.into()))?;
            }
            Ok(())
        }

        fn statfs(&self, path: &Path) -> Result<StatFs> {
            let s = nix::sys::statvfs::statvfs(path).map_err(|e| Error::Io(e.into()))?;
            Ok(StatFs {
                block_size: s.fragment_size(),
                blocks: s.blocks(),
                blocks_free: s.blocks_free(),
                blocks_available: s.blocks_available(),
                files: s.files(),
                files_free: s.files_free(),
                max_name_len: s.name_max(),
                f_type: 0,
                f_fsid: 0,
            })
        }
    }

    fn to_timespec(t: SystemTime) -> TimeSpec {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => TimeSpec::new(d.as_secs() as i64, d.subsec_nanos() as i64),
            Err(e) => {
                let d = e.duration();
                TimeSpec::new(-(d.as_secs() as i64), 0)
            }
        }
    }
}

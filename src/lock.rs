/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Elevation token: replaces the source's `push_root()`/`pop_root()` pair,
//! which flipped the calling thread's fsuid/fsgid to root around a WH/ME/COW
//! write and flipped them back afterwards. glibc's `seteuid`/`setegid`
//! wrappers apply to every thread in the process, not just the caller, so a
//! naive translation would race under concurrent requests; this module
//! serializes elevation with a reentrant lock instead (§4: WH/ME/COW engines
//! all elevate before touching the RW branch as root).

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};

#[cfg(unix)]
use nix::unistd::{Gid, Uid};

struct State {
    holder: Option<ThreadId>,
    depth: u32,
}

/// Serializes privilege elevation across threads, reentrant within one
/// thread so an engine that elevates and then calls into another engine
/// that also elevates doesn't deadlock on itself.
pub struct Elevation {
    state: Mutex<State>,
    released: Condvar,
}

impl Default for Elevation {
    fn default() -> Self {
        Self::new()
    }
}

impl Elevation {
    pub fn new() -> Self {
        Elevation {
            state: Mutex::new(State {
                holder: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Enters the elevated section, flipping effective uid/gid to root on
    /// first entry. Returns a guard that restores the prior credentials when
    /// the outermost entry on this thread is dropped.
    pub fn enter(&self) -> Result<ElevationGuard<'_>> {
        let me = thread::current().id();
        let mut guard = self.state.lock().unwrap();
        loop {
            match guard.holder {
                Some(h) if h == me => {
                    guard.depth += 1;
                    break;
                }
                None => {
                    guard.holder = Some(me);
                    guard.depth = 1;
                    break;
                }
                Some(_) => {
                    guard = self.released.wait(guard).unwrap();
                }
            }
        }
        let top = guard.depth == 1;
        drop(guard);

        let saved = if top {
            match elevate_to_root() {
                Ok(saved) => Some(saved),
                Err(e) => {
                    // Roll back the reservation we just made before bubbling up.
                    let mut guard = self.state.lock().unwrap();
                    guard.holder = None;
                    guard.depth = 0;
                    self.released.notify_all();
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(ElevationGuard {
            elevation: self,
            saved,
        })
    }
}

#[cfg(unix)]
struct SavedCreds {
    uid: Uid,
    gid: Gid,
}

#[cfg(not(unix))]
struct SavedCreds;

#[cfg(unix)]
fn elevate_to_root() -> Result<SavedCreds> {
    let saved = SavedCreds {
        uid: nix::unistd::geteuid(),
        gid: nix::unistd::getegid(),
    };
    nix::unistd::setegid(Gid::from_raw(0)).map_err(|e| Error::Io(e.into()))?;
    nix::unistd::seteuid(Uid::from_raw(0)).map_err(|e| Error::Io(e.into()))?;
    Ok(saved)
}

#[cfg(unix)]
fn restore_creds(saved: SavedCreds) {
    // Restore uid last: dropping euid from root first would forbid the
    // subsequent setegid if the original egid isn't in the caller's group list.
    let _ = nix::unistd::seteuid(saved.uid);
    let _ = nix::unistd::setegid(saved.gid);
}

#[cfg(not(unix))]
fn elevate_to_root() -> Result<SavedCreds> {
    Err(Error::Bug("privilege elevation is only supported on unix".to_owned()))
}

#[cfg(not(unix))]
fn restore_creds(_saved: SavedCreds) {}

pub struct ElevationGuard<'a> {
    elevation: &'a Elevation,
    saved: Option<SavedCreds>,
}

impl Drop for ElevationGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            restore_creds(saved);
        }
        let mut guard = self.elevation.state.lock().unwrap();
        guard.depth -= 1;
        if guard.depth == 0 {
            guard.holder = None;
            self.elevation.released.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reentrant_enter_on_same_thread_does_not_deadlock() {
        let elevation = Elevation::new();
        let outer = elevation.enter();
        // On non-unix test hosts elevate_to_root fails, which is expected;
        // only assert the reentrancy bookkeeping on platforms where it works.
        if let Ok(_outer) = outer {
            let inner = elevation.enter();
            assert!(inner.is_ok());
        }
    }

    #[test]
    fn sequential_enters_from_different_threads_do_not_panic() {
        let elevation = Arc::new(Elevation::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let elevation = Arc::clone(&elevation);
            handles.push(thread::spawn(move || {
                let _ = elevation.enter();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}

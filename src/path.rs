/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;

use crate::error::{Error, Result};

/// Default bound on a logical path's length (§3: "nominally 4096").
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// A single path component name (never `.`, `..`, nor containing `/`).
pub type Name = String;

/// An absolute logical path under the union root.
///
/// Mirrors the split/join/segment operations an abstract filesystem path type
/// needs, but additionally enforces the union's length bound and absolute-path
/// shape at construction time instead of leaving validation to callers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalPath(String);

impl Display for LogicalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LogicalPath {
    /// Builds a logical path, enforcing §3's shape and the given length bound.
    ///
    /// The bound applies to the logical path itself; concrete (branch-prefixed)
    /// paths are checked separately by the Path Translator, since the same
    /// logical path can compose into RO- or RW-concrete forms of different
    /// lengths.
    pub fn new(value: impl Into<String>, max_len: usize) -> Result<Self> {
        let value = value.into();
        if value.len() > max_len {
            return Err(Error::Invalid(format!(
                "path '{value}' exceeds maximum length {max_len}"
            )));
        }
        if !value.starts_with('/') {
            return Err(Error::Invalid(format!("path '{value}' is not absolute")));
        }
        if value.len() > 1 && value.ends_with('/') {
            return Err(Error::Invalid(format!(
                "path '{value}' has a trailing slash"
            )));
        }
        Ok(LogicalPath(value))
    }

    pub fn root() -> Self {
        LogicalPath("/".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Splits into `(parent, name)`. Fails `Invalid` on the root, which has no
    /// parent (mirrors the Path Translator's `to_sidecar` failure mode for
    /// paths with no `/`, since the root already consumed its only slash).
    pub fn split(&self) -> Result<(LogicalPath, Name)> {
        if self.is_root() {
            return Err(Error::Invalid("root has no parent".to_owned()));
        }
        let split_at = self.0.rfind('/').expect("absolute path always has '/'");
        let (parent, name) = (&self.0[..split_at], &self.0[split_at + 1..]);
        let parent = if parent.is_empty() { "/" } else { parent };
        Ok((LogicalPath(parent.to_owned()), name.to_owned()))
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn join(&self, name: &str) -> LogicalPath {
        if self.is_root() {
            LogicalPath(format!("/{name}"))
        } else {
            LogicalPath(format!("{}/{}", self.0, name))
        }
    }

    /// Every directory ancestor of this path, root first, not including the
    /// path itself. Used by the Access Gate's `can_traverse`.
    pub fn ancestors(&self) -> Vec<LogicalPath> {
        let mut out = vec![LogicalPath::root()];
        let mut acc = LogicalPath::root();
        let segments = self.segments();
        for seg in segments.iter().take(segments.len().saturating_sub(1)) {
            acc = acc.join(seg);
            out.push(acc.clone());
        }
        out
    }
}

pub const RESERVED_PREFIX_LEN: usize = 4;
pub const ME_PREFIX: &str = ".me.";
pub const WH_PREFIX: &str = ".wh.";

pub fn is_special(name: &str) -> bool {
    name == "." || name == ".."
}

pub fn is_me(name: &str) -> bool {
    name.len() > RESERVED_PREFIX_LEN && name.starts_with(ME_PREFIX)
}

pub fn is_whiteout(name: &str) -> bool {
    name.len() > RESERVED_PREFIX_LEN && name.starts_with(WH_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_round_trip() {
        let p = LogicalPath::new("/a/b/c", DEFAULT_MAX_PATH_LEN).unwrap();
        let (parent, name) = p.split().unwrap();
        assert_eq!(parent.as_str(), "/a/b");
        assert_eq!(name, "c");
        assert_eq!(parent.join(&name), p);
    }

    #[test]
    fn split_at_first_level() {
        let p = LogicalPath::new("/a", DEFAULT_MAX_PATH_LEN).unwrap();
        let (parent, name) = p.split().unwrap();
        assert!(parent.is_root());
        assert_eq!(name, "a");
    }

    #[test]
    fn root_has_no_parent() {
        assert!(LogicalPath::root().split().is_err());
    }

    #[test]
    fn rejects_relative_and_overlong() {
        assert!(LogicalPath::new("a/b", DEFAULT_MAX_PATH_LEN).is_err());
        assert!(LogicalPath::new("/a/".to_owned() + &"b".repeat(10), 8).is_err());
    }

    #[test]
    fn ancestors_root_first() {
        let p = LogicalPath::new("/a/b/c", DEFAULT_MAX_PATH_LEN).unwrap();
        let anc: Vec<_> = p.ancestors().iter().map(|p| p.as_str().to_owned()).collect();
        assert_eq!(anc, vec!["/".to_owned(), "/a".to_owned(), "/a/b".to_owned()]);
    }

    #[test]
    fn reserved_prefixes() {
        assert!(is_me(".me.foo"));
        assert!(!is_me(".me."));
        assert!(is_whiteout(".wh.foo"));
        assert!(!is_whiteout(".wh"));
        assert!(is_special("."));
        assert!(is_special(".."));
        assert!(!is_special(".foo"));
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use thiserror::Error;

use crate::path::LogicalPath;

pub type Result<T> = std::result::Result<T, Error>;

/// Portable error taxonomy for the union filesystem core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("'{0}' not found")]
    NotFound(LogicalPath),
    #[error("'{0}' already exists")]
    Exists(LogicalPath),
    #[error("concrete path for '{0}' would exceed the maximum length")]
    NameTooLong(LogicalPath),
    #[error("invalid path '{0}'")]
    Invalid(String),
    #[error("permission denied on '{0}'")]
    Permission(LogicalPath),
    #[error("'{0}' is not empty")]
    NotEmpty(LogicalPath),
    #[error("allocation failed")]
    OutOfMemory,
    #[error("internal invariant violated: {0}")]
    Bug(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that should surface to the adapter as `ENOENT`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

use crate::path::DEFAULT_MAX_PATH_LEN;

/// Default copy-up buffer size (§4.5, §10.3): the source's `MAXSIZE`.
const DEFAULT_COPY_BUF_SIZE: usize = 4096;

/// Default path handed to `log4rs::init_file` (§10.3) when not overridden.
const DEFAULT_LOG4RS_PATH: &str = "log4rs.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    /// Upper bound on a concrete (branch-prefixed) path's length.
    pub max_path_len: usize,
    /// Seed fed to the inode-number hash (§9); two deployments sharing a
    /// seed produce colliding synthetic inode numbers for the same paths,
    /// so operators running more than one union on the same host should
    /// pick distinct seeds.
    pub ino_seed: u64,
    /// Buffer size used by the copy-up engine's file-content copy loop.
    pub copy_buf_size: usize,
    /// Path to the `log4rs` logging configuration file.
    pub log4rs_path: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_path_len: DEFAULT_MAX_PATH_LEN,
            ino_seed: 0,
            copy_buf_size: DEFAULT_COPY_BUF_SIZE,
            log4rs_path: DEFAULT_LOG4RS_PATH.to_owned(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            limits: LimitsConfig::default(),
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file in TOML format
    #[arg(long, default_value_t = String::from("./unionfs.toml"))]
    pub config_path: String,

    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
#[clap(rename_all = "kebab_case")]
pub enum Mode {
    /// Parse and validate a `BRANCH:BRANCH` mount spec without touching
    /// anything beyond stat-ing both roots
    Check {
        /// `BRANCH:BRANCH` mount argument, e.g. `/data/rw:/data/ro=RO`
        branches: String,
    },
    /// Print the merged attributes of a logical path
    Stat {
        /// `BRANCH:BRANCH` mount argument
        branches: String,
        /// Absolute logical path under the union root
        path: String,
    },
    /// List a directory's merged contents
    List {
        /// `BRANCH:BRANCH` mount argument
        branches: String,
        /// Absolute logical path under the union root
        path: String,
    },
    /// Force an RO-resident object up to the RW branch
    CpUp {
        /// `BRANCH:BRANCH` mount argument
        branches: String,
        /// Absolute logical path under the union root
        path: String,
    },
    /// Create an empty file, or bump an existing one's times to now
    Touch {
        /// `BRANCH:BRANCH` mount argument
        branches: String,
        /// Absolute logical path under the union root
        path: String,
        /// Permission bits for a newly created file
        #[arg(long, default_value_t = 0o644)]
        mode: u32,
    },
    /// Remove a file (or an empty directory can only be removed via `mkdir`'s
    /// counterpart, `rmdir`, which this subcommand does not expose)
    Rm {
        /// `BRANCH:BRANCH` mount argument
        branches: String,
        /// Absolute logical path under the union root
        path: String,
    },
    /// Create a directory
    Mkdir {
        /// `BRANCH:BRANCH` mount argument
        branches: String,
        /// Absolute logical path under the union root
        path: String,
        /// Permission bits for the new directory
        #[arg(long, default_value_t = 0o755)]
        mode: u32,
    },
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;

use anyhow::{Context, Ok};
use args::Args;
use clap::Parser;
use log::info;

use unionfs::access::Credentials;
use unionfs::config::Config;
use unionfs::me::MeFields;
use unionfs::path::LogicalPath;
use unionfs::vfs::RealFs;
use unionfs::{mount, ops::UnionFs};

mod args;

fn main() {
    let status = run();
    if let Err(ref err) = status {
        log::error!("{:?}", err);
        std::process::exit(1);
    }
}

fn current_credentials() -> Credentials {
    Credentials {
        uid: nix::unistd::geteuid().as_raw(),
        gid: nix::unistd::getegid().as_raw(),
    }
}

fn open_union(branches: &str, config: &Config) -> anyhow::Result<UnionFs> {
    let spec = mount::parse_mount_spec(branches).with_context(|| "failed to parse mount argument")?;
    UnionFs::new(
        Box::new(RealFs),
        spec,
        config.limits.max_path_len,
        config.limits.ino_seed,
        config.limits.copy_buf_size,
    )
    .with_context(|| "failed to open union filesystem")
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    info!("read configuration");
    let config = fs::read_to_string(&args.config_path).with_context(|| "failed to read configuration file")?;
    let config: Config = toml::from_str(&config).with_context(|| "failed to parse configuration")?;

    log4rs::init_file(&config.limits.log4rs_path, Default::default()).with_context(|| "failed to init logger")?;
    info!("init logger");

    match args.mode {
        args::Mode::Check { branches } => {
            let spec = mount::parse_mount_spec(&branches).with_context(|| "failed to parse mount argument")?;
            mount::validate_branches(&RealFs, &spec).with_context(|| "branch validation failed")?;
            info!("ro='{}' rw='{}' are both valid directories", spec.ro_root.display(), spec.rw_root.display());
            println!("ok: ro='{}' rw='{}'", spec.ro_root.display(), spec.rw_root.display());
        }
        args::Mode::Stat { branches, path } => {
            let union = open_union(&branches, &config)?;
            let logical = LogicalPath::new(path, config.limits.max_path_len)
                .with_context(|| "invalid logical path")?;
            let creds = current_credentials();
            let attr = union
                .getattr(&creds, &logical)
                .with_context(|| format!("stat '{logical}' failed"))?;
            println!(
                "{} ino={} mode={:o} uid={} gid={} size={}",
                logical, attr.ino, attr.mode, attr.uid, attr.gid, attr.size
            );
        }
        args::Mode::List { branches, path } => {
            let union = open_union(&branches, &config)?;
            let logical = LogicalPath::new(path, config.limits.max_path_len)
                .with_context(|| "invalid logical path")?;
            let creds = current_credentials();
            let entries = union
                .readdir(&creds, &logical)
                .with_context(|| format!("readdir '{logical}' failed"))?;
            for entry in entries {
                println!("{}\t{:?}", entry.name, entry.file_type);
            }
        }
        args::Mode::CpUp { branches, path } => {
            let union = open_union(&branches, &config)?;
            let logical = LogicalPath::new(path, config.limits.max_path_len)
                .with_context(|| "invalid logical path")?;
            let creds = current_credentials();
            let attr = union
                .cp_up(&creds, &logical)
                .with_context(|| format!("cp-up '{logical}' failed"))?;
            println!("{} copied up, ino={}", logical, attr.ino);
        }
        args::Mode::Touch { branches, path, mode } => {
            let union = open_union(&branches, &config)?;
            let logical = LogicalPath::new(path, config.limits.max_path_len)
                .with_context(|| "invalid logical path")?;
            let creds = current_credentials();
            let attr = match union.create(&creds, &logical, mode) {
                Ok(attr) => attr,
                Err(unionfs::Error::Exists(_)) => {
                    let mut new_attr = union
                        .getattr(&creds, &logical)
                        .with_context(|| format!("stat '{logical}' failed"))?;
                    let now = std::time::SystemTime::now();
                    new_attr.atime = now;
                    new_attr.mtime = now;
                    union
                        .setattr(&creds, &logical, &new_attr, MeFields::TIME)
                        .with_context(|| format!("touch '{logical}' failed"))?
                }
                Err(e) => return Err(e).with_context(|| format!("touch '{logical}' failed")),
            };
            println!("{} ino={}", logical, attr.ino);
        }
        args::Mode::Rm { branches, path } => {
            let union = open_union(&branches, &config)?;
            let logical = LogicalPath::new(path, config.limits.max_path_len)
                .with_context(|| "invalid logical path")?;
            let creds = current_credentials();
            union
                .unlink(&creds, &logical)
                .with_context(|| format!("rm '{logical}' failed"))?;
        }
        args::Mode::Mkdir { branches, path, mode } => {
            let union = open_union(&branches, &config)?;
            let logical = LogicalPath::new(path, config.limits.max_path_len)
                .with_context(|| "invalid logical path")?;
            let creds = current_credentials();
            let attr = union
                .mkdir(&creds, &logical, mode)
                .with_context(|| format!("mkdir '{logical}' failed"))?;
            println!("{} ino={}", logical, attr.ino);
        }
    }
    Ok(())
}

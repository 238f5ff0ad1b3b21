// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Finds the mounted filesystems to scrub and the physical disks behind them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use log::{debug, warn};
use serde::Deserialize;

use crate::process_tools;

/// mountpoint -> kernel names of the disks it lives on
pub type MountMap = BTreeMap<PathBuf, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mountpoint: PathBuf,
    pub devices: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
pub struct LsblkOutput {
    #[serde(default)]
    pub blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
pub struct BlockDevice {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kname: Option<String>,
    #[serde(rename = "type")]
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub fstype: Option<String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub children: Vec<BlockDevice>,
}

/// Queries lsblk and returns every mounted `fstype` filesystem. Any failure
/// means "nothing to scrub" and yields an empty map.
pub fn build_mount_map(lsblk: &Path, fstype: &str) -> MountMap {
    match query_block_devices(lsblk) {
        Ok(tree) => collect_mounts(&tree, fstype),
        Err(err) => {
            warn!("block device enumeration failed: {err:#}");
            MountMap::new()
        }
    }
}

fn query_block_devices(lsblk: &Path) -> anyhow::Result<LsblkOutput> {
    let output = process_tools::command(lsblk)
        .args(["-o", "NAME,KNAME,TYPE,FSTYPE,MOUNTPOINT", "-J"])
        .output()
        .with_context(|| format!("failed to run {}", lsblk.display()))?;
    if !output.status.success() {
        bail!(
            "{} failed: {}",
            lsblk.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout).context("failed to parse lsblk JSON output")
}

/// Walks each top-level device down to its leaves and attaches the
/// top-level device's kernel name to every matching mountpoint found on the way.
pub fn collect_mounts(tree: &LsblkOutput, fstype: &str) -> MountMap {
    let mut mounts = MountMap::new();
    for disk in &tree.blockdevices {
        let Some(disk_id) = disk.kname.as_deref().or(disk.name.as_deref()) else {
            debug!("skipping block device without a kernel name: {:?}", disk);
            continue;
        };
        walk(disk, fstype, disk_id, &mut mounts);
    }
    mounts
}

fn walk(dev: &BlockDevice, fstype: &str, disk_id: &str, mounts: &mut MountMap) {
    if dev.fstype.as_deref() == Some(fstype) {
        if let Some(mountpoint) = dev.mountpoint.as_deref().filter(|m| !m.is_empty()) {
            debug!(
                "{} ({}) on {} backs {}",
                dev.name.as_deref().unwrap_or("?"),
                dev.kind.as_deref().unwrap_or("?"),
                disk_id,
                mountpoint
            );
            mounts
                .entry(PathBuf::from(mountpoint))
                .or_default()
                .insert(disk_id.to_string());
        }
    }
    for child in &dev.children {
        walk(child, fstype, disk_id, mounts);
    }
}

//! Block device identification: UUID, PARTUUID, PARTLABEL and lsblk listings.
//!
//! The bootloader configurator uses these to locate the root and boot
//! partitions of a freshly built image.

use std::path::Path;

use serde::Deserialize;

use super::ops::DiskOps;
use crate::error::{DiskError, Result};
use crate::process::Cmd;

/// lsblk columns requested for every listing.
pub const LSBLK_COLUMNS: &str = "NAME,PATH,PARTTYPE,FSTYPE,UUID,MOUNTPOINT,PARTUUID,PARTLABEL,TYPE";

/// One row of `lsblk --json --list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockDevice {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub parttype: Option<String>,
    #[serde(default)]
    pub fstype: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub partuuid: Option<String>,
    #[serde(default)]
    pub partlabel: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl BlockDevice {
    pub fn is_partition(&self) -> bool {
        self.kind == "part"
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

pub fn lsblk_cmd(disk: &Path) -> Cmd {
    Cmd::new("lsblk")
        .args(["--json", "--list", "--output", LSBLK_COLUMNS])
        .arg_path(disk)
}

pub fn blkid_cmd(device: &Path, tag: &str) -> Cmd {
    Cmd::new("blkid")
        .arg_path(device)
        .args(["-s", tag, "-o", "value"])
}

pub fn parse_lsblk_json(output: &str) -> Result<Vec<BlockDevice>> {
    let parsed: LsblkOutput = serde_json::from_str(output)
        .map_err(|e| DiskError::io("failed to parse lsblk output", e))?;
    Ok(parsed.blockdevices)
}

/// Filesystem UUID.
pub fn uuid(ops: &dyn DiskOps, device: &Path) -> Result<String> {
    tag(ops, device, "UUID")
}

pub fn part_uuid(ops: &dyn DiskOps, device: &Path) -> Result<String> {
    tag(ops, device, "PARTUUID")
}

pub fn part_label(ops: &dyn DiskOps, device: &Path) -> Result<String> {
    tag(ops, device, "PARTLABEL")
}

fn tag(ops: &dyn DiskOps, device: &Path, name: &str) -> Result<String> {
    let value = ops.blkid_tag(device, name)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(DiskError::io(
            format!("failed to read {} of {}", name, device.display()),
            "no value reported",
        ));
    }
    Ok(value.to_string())
}

/// The lsblk entry of the disk itself.
pub fn device_info(ops: &dyn DiskOps, disk: &Path) -> Result<BlockDevice> {
    ops.lsblk(disk)?
        .into_iter()
        .find(|d| Path::new(&d.path) == disk)
        .ok_or_else(|| {
            DiskError::io(
                format!("failed to query {}", disk.display()),
                "device not listed by lsblk",
            )
        })
}

/// Partitions of `disk`, in lsblk order.
pub fn partitions(ops: &dyn DiskOps, disk: &Path) -> Result<Vec<BlockDevice>> {
    Ok(ops
        .lsblk(disk)?
        .into_iter()
        .filter(BlockDevice::is_partition)
        .collect())
}

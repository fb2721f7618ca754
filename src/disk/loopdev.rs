//! Loopback devices over raw image files.
//!
//! A [`LoopDevice`] owns one attachment for the length of a build and
//! detaches it on drop if nobody did so explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::ops::DiskOps;
use super::size::Size;
use crate::error::{DiskError, Result, ValidationError};

/// What `losetup --show` must print for the attachment to count.
pub const LOOP_DEVICE_PATTERN: &str = r"^/dev/loop\d+$";

static LOOP_DEVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LOOP_DEVICE_PATTERN).expect("loop device pattern is valid"));

/// One row of `losetup -l --json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoopInfo {
    pub name: String,
    #[serde(rename = "back-file", default)]
    pub back_file: Option<String>,
    #[serde(default)]
    pub sizelimit: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub autoclear: bool,
    #[serde(default)]
    pub ro: bool,
    #[serde(default)]
    pub dio: bool,
}

#[derive(Debug, Deserialize)]
struct LosetupList {
    #[serde(default)]
    loopdevices: Vec<LoopInfo>,
}

/// Parse `losetup -l --json`. No attached devices prints nothing at all.
pub fn parse_losetup_json(output: &str) -> Result<Vec<LoopInfo>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: LosetupList = serde_json::from_str(output)
        .map_err(|e| DiskError::io("failed to parse losetup output", e))?;
    Ok(list.loopdevices)
}

/// Validate a size string, create parent directories, then allocate
/// `path` with that many bytes.
pub fn allocate_raw_file(ops: &dyn DiskOps, path: &Path, size: Size) -> Result<()> {
    let bytes = size.bytes()?;
    if bytes == 0 {
        return Err(ValidationError::size(
            size.to_string(),
            "raw image size must be explicit",
        )
        .into());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| DiskError::io(format!("failed to create {}", parent.display()), e))?;
    }
    ops.allocate(path, bytes)
}

/// Attached loop devices.
pub fn list_all(ops: &dyn DiskOps) -> Result<Vec<LoopInfo>> {
    ops.loop_list(None)
}

pub fn info(ops: &dyn DiskOps, device: &Path) -> Result<LoopInfo> {
    ops.loop_list(Some(device))?
        .into_iter()
        .find(|l| Path::new(&l.name) == device)
        .ok_or_else(|| {
            DiskError::io(
                format!("failed to query {}", device.display()),
                "not an attached loop device",
            )
        })
}

pub fn backing_file(ops: &dyn DiskOps, device: &Path) -> Result<PathBuf> {
    info(ops, device)?
        .back_file
        .map(PathBuf::from)
        .ok_or_else(|| {
            DiskError::io(
                format!("failed to query {}", device.display()),
                "no backing file",
            )
        })
}

pub fn detach(ops: &dyn DiskOps, device: &Path) -> Result<()> {
    ops.loop_detach(device)
}

/// An attached loop device with single-owner lifetime.
pub struct LoopDevice<'a> {
    ops: &'a dyn DiskOps,
    path: PathBuf,
    backing_file: PathBuf,
    attached: bool,
}

impl<'a> LoopDevice<'a> {
    /// Attach `image` with direct I/O and partition scanning.
    pub fn attach(ops: &'a dyn DiskOps, image: &Path) -> Result<Self> {
        let printed = ops.loop_attach(image)?;
        let printed = printed.trim();

        if !LOOP_DEVICE_RE.is_match(printed) {
            return Err(DiskError::io(
                format!("failed to attach {}", image.display()),
                format!("unexpected loop device path '{}'", printed),
            ));
        }

        tracing::info!(device = printed, image = %image.display(), "loop device attached");
        Ok(Self {
            ops,
            path: PathBuf::from(printed),
            backing_file: image.to_path_buf(),
            attached: true,
        })
    }

    /// Allocate `image` at `size`, then attach it.
    pub fn create_empty_backed_by(ops: &'a dyn DiskOps, image: &Path, size: Size) -> Result<Self> {
        allocate_raw_file(ops, image, size)?;
        Self::attach(ops, image)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backing_file(&self) -> &Path {
        &self.backing_file
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn info(&self) -> Result<LoopInfo> {
        info(self.ops, &self.path)
    }

    /// Detach once. Later calls, including the one from `Drop`, do nothing,
    /// even when this attempt failed.
    pub fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        self.attached = false;
        self.ops.loop_detach(&self.path)?;
        tracing::info!(device = %self.path.display(), "loop device detached");
        Ok(())
    }
}

impl Drop for LoopDevice<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            tracing::warn!(device = %self.path.display(), error = %e, "failed to detach loop device");
        }
    }
}

impl std::fmt::Debug for LoopDevice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopDevice")
            .field("path", &self.path)
            .field("backing_file", &self.backing_file)
            .field("attached", &self.attached)
            .finish()
    }
}

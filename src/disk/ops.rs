//! The disk operations capability.
//!
//! Everything that touches a device goes through [`DiskOps`]. The planner,
//! the partition session and the raw image orchestrator only see this trait,
//! so their ordering and rollback logic runs against a recording fake in
//! tests and against [`SystemDiskOps`] in production.

use std::path::{Path, PathBuf};

use super::blkid::{self, BlockDevice};
use super::format;
use super::geometry::{self, DiskGeometry};
use super::loopdev::{self, LoopInfo};
use super::plan::PlannedPartition;
use super::probe;
use super::spec::{FsType, TableKind};
use super::table;
use crate::config::Config;
use crate::error::{DiskError, Result};
use crate::process::{Cmd, CommandResult};

pub trait DiskOps {
    /// Allocate a regular file of exactly `bytes` bytes.
    fn allocate(&self, path: &Path, bytes: u64) -> Result<()>;

    /// Whether `disk` already carries a table with partitions on it.
    fn has_partition_table(&self, disk: &Path) -> Result<bool>;

    /// Clear every filesystem and partition signature, then flush.
    fn wipe(&self, disk: &Path) -> Result<()>;

    fn geometry(&self, disk: &Path) -> Result<DiskGeometry>;

    fn create_table(&self, disk: &Path, kind: TableKind) -> Result<()>;

    fn append_partition(&self, disk: &Path, entry: &PlannedPartition) -> Result<()>;

    /// Make the kernel re-read the table of `disk`.
    fn refresh(&self, disk: &Path) -> Result<()>;

    fn delete_partition(&self, disk: &Path, number: u32) -> Result<()>;

    /// Remove a deleted partition from the kernel's view.
    fn forget_partition(&self, disk: &Path, number: u32) -> Result<()>;

    fn format(&self, device: &Path, fs: FsType) -> Result<()>;

    fn activate_swap(&self, device: &Path) -> Result<()>;

    /// Attach `image` and return the device path exactly as the tool printed it.
    fn loop_attach(&self, image: &Path) -> Result<String>;

    fn loop_detach(&self, device: &Path) -> Result<()>;

    /// All attached loop devices, or only `device` when given.
    fn loop_list(&self, device: Option<&Path>) -> Result<Vec<LoopInfo>>;

    /// Raw `blkid` value for one tag of `device`.
    fn blkid_tag(&self, device: &Path, tag: &str) -> Result<String>;

    fn lsblk(&self, disk: &Path) -> Result<Vec<BlockDevice>>;
}

/// [`DiskOps`] backed by util-linux, e2fsprogs and sysfs.
#[derive(Debug, Clone)]
pub struct SystemDiskOps {
    sudo: bool,
    sysfs_root: PathBuf,
}

impl Default for SystemDiskOps {
    fn default() -> Self {
        Self {
            sudo: false,
            sysfs_root: PathBuf::from(crate::config::DEFAULT_SYSFS_ROOT),
        }
    }
}

impl SystemDiskOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            sudo: config.use_sudo,
            sysfs_root: config.sysfs_root.clone(),
        }
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    fn exec(&self, cmd: Cmd) -> Result<CommandResult> {
        let line = cmd.command_line();
        cmd.sudo(self.sudo)
            .run()
            .map_err(|e| DiskError::io(line, e))
    }
}

impl DiskOps for SystemDiskOps {
    fn allocate(&self, path: &Path, bytes: u64) -> Result<()> {
        self.exec(
            Cmd::new("fallocate")
                .args(["-l", &bytes.to_string()])
                .arg_path(path)
                .error_msg(format!("failed to allocate {}", path.display())),
        )?;
        Ok(())
    }

    fn has_partition_table(&self, disk: &Path) -> Result<bool> {
        let result = self.exec(probe::has_table_cmd(disk))?;
        probe::parse_has_table(disk, &result)
    }

    fn wipe(&self, disk: &Path) -> Result<()> {
        self.exec(
            Cmd::new("wipefs")
                .args(["-a", "-f"])
                .arg_path(disk)
                .error_msg(format!("failed to wipe {}", disk.display())),
        )?;
        self.exec(Cmd::new("sync"))?;
        Ok(())
    }

    fn geometry(&self, disk: &Path) -> Result<DiskGeometry> {
        let name = probe::disk_name_from_path(disk)?;
        geometry::read_geometry(&self.sysfs_root, &name)
    }

    fn create_table(&self, disk: &Path, kind: TableKind) -> Result<()> {
        self.exec(table::create_table_cmd(disk, kind))?;
        Ok(())
    }

    fn append_partition(&self, disk: &Path, entry: &PlannedPartition) -> Result<()> {
        self.exec(table::append_cmd(disk, entry))?;
        Ok(())
    }

    fn refresh(&self, disk: &Path) -> Result<()> {
        self.exec(table::refresh_cmd(disk))?;
        Ok(())
    }

    fn delete_partition(&self, disk: &Path, number: u32) -> Result<()> {
        self.exec(table::delete_cmd(disk, number))?;
        Ok(())
    }

    fn forget_partition(&self, disk: &Path, number: u32) -> Result<()> {
        self.exec(table::forget_cmd(disk, number))?;
        Ok(())
    }

    fn format(&self, device: &Path, fs: FsType) -> Result<()> {
        self.exec(format::format_cmd(&device.to_string_lossy(), fs))?;
        Ok(())
    }

    fn activate_swap(&self, device: &Path) -> Result<()> {
        self.exec(format::swapon_cmd(&device.to_string_lossy()))?;
        Ok(())
    }

    fn loop_attach(&self, image: &Path) -> Result<String> {
        let result = self.exec(
            Cmd::new("losetup")
                .args(["--direct-io=on", "--show", "-f", "-P"])
                .arg_path(image)
                .error_msg(format!("failed to attach {}", image.display())),
        )?;
        Ok(result.stdout_trimmed().to_string())
    }

    fn loop_detach(&self, device: &Path) -> Result<()> {
        self.exec(
            Cmd::new("losetup")
                .arg("-d")
                .arg_path(device)
                .error_msg(format!("failed to detach {}", device.display())),
        )?;
        Ok(())
    }

    fn loop_list(&self, device: Option<&Path>) -> Result<Vec<LoopInfo>> {
        let mut cmd = Cmd::new("losetup").arg("-l");
        if let Some(device) = device {
            cmd = cmd.arg_path(device);
        }
        let result = self.exec(cmd.arg("--json"))?;
        loopdev::parse_losetup_json(&result.stdout)
    }

    fn blkid_tag(&self, device: &Path, tag: &str) -> Result<String> {
        let result = self.exec(blkid::blkid_cmd(device, tag))?;
        Ok(result.stdout_trimmed().to_string())
    }

    fn lsblk(&self, disk: &Path) -> Result<Vec<BlockDevice>> {
        let result = self.exec(blkid::lsblk_cmd(disk))?;
        blkid::parse_lsblk_json(&result.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_geometry_reads_configured_sysfs() {
        let sysfs = TempDir::new().unwrap();
        let queue = sysfs.path().join("loop4/queue");
        fs::create_dir_all(&queue).unwrap();
        fs::write(queue.join("hw_sector_size"), "512\n").unwrap();
        fs::write(queue.join("physical_block_size"), "4096\n").unwrap();

        let ops = SystemDiskOps::new().with_sysfs_root(sysfs.path());
        let g = ops.geometry(Path::new("/dev/loop4")).unwrap();
        assert_eq!(g, DiskGeometry::new(512, 4096));
    }

    #[test]
    fn test_geometry_rejects_non_dev_path() {
        let ops = SystemDiskOps::new();
        let err = ops.geometry(Path::new("/tmp/disk.raw")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_allocate_creates_file_of_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.raw");
        if SystemDiskOps::new().allocate(&path, 1 << 20).is_ok() {
            assert_eq!(fs::metadata(&path).unwrap().len(), 1 << 20);
        }
    }
}

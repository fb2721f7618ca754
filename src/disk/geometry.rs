//! Logical sector and physical block sizes of a block device.

use std::fs;
use std::path::Path;

use crate::error::{DiskError, Result, ValidationError};

/// Sector sizes of one block device, queried fresh for every build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    /// Logical (hardware) sector size in bytes.
    pub logical_sector_bytes: u64,
    /// Physical block size in bytes.
    pub physical_block_bytes: u64,
}

impl DiskGeometry {
    pub fn new(logical_sector_bytes: u64, physical_block_bytes: u64) -> Self {
        Self {
            logical_sector_bytes,
            physical_block_bytes,
        }
    }

    /// Plain 512-byte sectors on 512-byte blocks.
    pub fn classic() -> Self {
        Self::new(512, 512)
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.logical_sector_bytes == 0 || self.physical_block_bytes == 0 {
            return Err(ValidationError::Geometry(format!(
                "zero sector size ({}/{})",
                self.logical_sector_bytes, self.physical_block_bytes
            )));
        }
        if self.physical_block_bytes % self.logical_sector_bytes != 0 {
            return Err(ValidationError::Geometry(format!(
                "physical block {} is not a multiple of logical sector {}",
                self.physical_block_bytes, self.logical_sector_bytes
            )));
        }
        Ok(())
    }

    /// Sector number for a byte offset, rounded up to the physical block
    /// boundary when the physical block is larger than the logical sector.
    pub fn aligned_sector(&self, bytes: u64) -> std::result::Result<u64, ValidationError> {
        self.validate()?;
        let boundary = self.physical_block_bytes.max(self.logical_sector_bytes);
        let aligned = bytes
            .div_ceil(boundary)
            .checked_mul(boundary)
            .ok_or_else(|| ValidationError::Geometry(format!("offset {} overflows", bytes)))?;
        Ok(aligned / self.logical_sector_bytes)
    }
}

/// Logical sector size from `<sysfs_root>/<disk>/queue/hw_sector_size`.
pub fn logical_sector_size(sysfs_root: &Path, disk_name: &str) -> Result<u64> {
    read_queue_attr(sysfs_root, disk_name, "hw_sector_size")
}

/// Physical block size from `<sysfs_root>/<disk>/queue/physical_block_size`.
pub fn physical_block_size(sysfs_root: &Path, disk_name: &str) -> Result<u64> {
    read_queue_attr(sysfs_root, disk_name, "physical_block_size")
}

/// Read both sizes for one disk.
pub fn read_geometry(sysfs_root: &Path, disk_name: &str) -> Result<DiskGeometry> {
    let geometry = DiskGeometry::new(
        logical_sector_size(sysfs_root, disk_name)?,
        physical_block_size(sysfs_root, disk_name)?,
    );
    geometry.validate()?;
    Ok(geometry)
}

fn read_queue_attr(sysfs_root: &Path, disk_name: &str, attr: &str) -> Result<u64> {
    let path = sysfs_root.join(disk_name).join("queue").join(attr);
    let content = fs::read_to_string(&path)
        .map_err(|e| DiskError::io(format!("failed to read {}", path.display()), e))?;
    content
        .trim()
        .parse()
        .map_err(|e| DiskError::io(format!("failed to parse {}", path.display()), e))
}

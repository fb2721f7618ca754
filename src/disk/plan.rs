//! Partition planning: numbers, aligned sectors, MBR extended/logical chaining.
//!
//! Planning is pure. It never touches a device, so every layout error is
//! reported before the partition table is written.
//!
//! MBR holds at most four table entries. A layout with more than four
//! partitions becomes:
//!
//! ```text
//! 1..3   primary
//! 4      extended (start of the 4th spec .. end of the last spec), type 0x05
//! 5..N+1 logical, one per remaining spec, nested in the extended region
//! ```
//!
//! Each logical partition is shifted one sector past its computed start
//! (and non-sentinel end) because the extended partition header occupies
//! that sector. The last logical partition ends exactly where the extended
//! partition ends.

use std::fmt;
use std::str::FromStr;

use super::geometry::DiskGeometry;
use super::parttype::{mbr, PartitionType, TypeCode};
use super::size::Size;
use super::spec::{DiskSpec, FsType, PartitionSpec, TableKind};
use crate::error::ValidationError;

/// Most table entries an MBR can hold.
pub const MBR_MAX_PRIMARY: usize = 4;

/// MBR classification of a planned entry. GPT entries are always primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Primary,
    Extended,
    Logical,
}

impl PartitionKind {
    pub fn name(self) -> &'static str {
        match self {
            PartitionKind::Primary => "primary",
            PartitionKind::Extended => "extended",
            PartitionKind::Logical => "logical",
        }
    }
}

impl FromStr for PartitionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(PartitionKind::Primary),
            "extended" => Ok(PartitionKind::Extended),
            "logical" => Ok(PartitionKind::Logical),
            other => Err(ValidationError::UnknownPartitionKind(other.to_string())),
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One concrete partition-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPartition {
    /// 1-based partition number as the kernel will report it.
    pub number: u32,
    pub kind: PartitionKind,
    /// Template id; `None` for the synthesized extended partition.
    pub id: Option<String>,
    /// GPT partition name. Not written for MBR.
    pub label: Option<String>,
    pub type_code: TypeCode,
    /// `None` for the extended partition, which is never formatted.
    pub fs_type: Option<FsType>,
    pub start_sector: u64,
    /// Exclusive end: `end_sector - 1` is the last usable sector.
    /// `None` extends to the end of the usable space.
    pub end_sector: Option<u64>,
    pub bootable: bool,
}

impl PlannedPartition {
    pub fn size_sectors(&self) -> Option<u64> {
        self.end_sector.map(|end| end - self.start_sector)
    }

    /// Name used in log lines and error messages.
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or(self.kind.name())
    }
}

/// The full plan for one disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub table: TableKind,
    pub geometry: DiskGeometry,
    /// Entries in creation order.
    pub entries: Vec<PlannedPartition>,
}

impl PartitionPlan {
    /// Entries stored in the table itself (primary and extended).
    pub fn table_entries(&self) -> impl Iterator<Item = &PlannedPartition> {
        self.entries
            .iter()
            .filter(|e| e.kind != PartitionKind::Logical)
    }

    pub fn logical_entries(&self) -> impl Iterator<Item = &PlannedPartition> {
        self.entries
            .iter()
            .filter(|e| e.kind == PartitionKind::Logical)
    }

    pub fn extended(&self) -> Option<&PlannedPartition> {
        self.entries
            .iter()
            .find(|e| e.kind == PartitionKind::Extended)
    }

    pub fn entry_for(&self, id: &str) -> Option<&PlannedPartition> {
        self.entries.iter().find(|e| e.id.as_deref() == Some(id))
    }
}

/// Plan every partition of `disk` against the geometry of the target device.
pub fn plan(disk: &DiskSpec, geometry: DiskGeometry) -> Result<PartitionPlan, ValidationError> {
    disk.validate()?;
    geometry.validate()?;

    let planner = Planner {
        table: disk.partition_table_type,
        geometry,
        disk_bytes: disk.size.bytes()?,
    };

    let parts = &disk.partitions;
    let mut entries = Vec::with_capacity(parts.len() + 1);

    let needs_extended =
        disk.partition_table_type == TableKind::Mbr && parts.len() > MBR_MAX_PRIMARY;

    if !needs_extended {
        for (i, part) in parts.iter().enumerate() {
            entries.push(planner.entry(part, i as u32 + 1, PartitionKind::Primary)?);
        }
    } else {
        let first_logical = MBR_MAX_PRIMARY - 1;
        for (i, part) in parts[..first_logical].iter().enumerate() {
            entries.push(planner.entry(part, i as u32 + 1, PartitionKind::Primary)?);
        }

        let last = &parts[parts.len() - 1];
        entries.push(planner.extended(&parts[first_logical], last, first_logical as u32 + 1)?);

        for (i, part) in parts[first_logical..].iter().enumerate() {
            let number = MBR_MAX_PRIMARY as u32 + 1 + i as u32;
            entries.push(planner.entry(part, number, PartitionKind::Logical)?);
        }

        // The last logical partition may not run past its container.
        let extended_end = entries[first_logical].end_sector;
        if let Some(last) = entries.last_mut() {
            last.end_sector = extended_end;
            check_range(last.id.as_deref().unwrap_or_default(), last.start_sector, last.end_sector)?;
        }
    }

    Ok(PartitionPlan {
        table: disk.partition_table_type,
        geometry,
        entries,
    })
}

struct Planner {
    table: TableKind,
    geometry: DiskGeometry,
    /// Zero when the template leaves the disk size unspecified.
    disk_bytes: u64,
}

impl Planner {
    fn entry(
        &self,
        part: &PartitionSpec,
        number: u32,
        kind: PartitionKind,
    ) -> Result<PlannedPartition, ValidationError> {
        let (mut start_sector, mut end_sector) = self.bounds(&part.id, part.start, part.end)?;

        if kind == PartitionKind::Logical {
            start_sector += 1;
            end_sector = end_sector.map(|end| end + 1);
        }
        check_range(&part.id, start_sector, end_sector)?;

        let (type_code, label, bootable) = match self.table {
            TableKind::Gpt => (
                TypeCode::Gpt(part.resolved_guid()),
                Some(part.label().to_string()),
                false,
            ),
            TableKind::Mbr => (TypeCode::Mbr(mbr_type(part)), None, part.has_flag("boot")),
        };

        Ok(PlannedPartition {
            number,
            kind,
            id: Some(part.id.clone()),
            label,
            type_code,
            fs_type: Some(part.fs_type),
            start_sector,
            end_sector,
            bootable,
        })
    }

    /// The extended container spanning the first logical spec to the last spec.
    fn extended(
        &self,
        first: &PartitionSpec,
        last: &PartitionSpec,
        number: u32,
    ) -> Result<PlannedPartition, ValidationError> {
        let (start_sector, end_sector) = self.bounds(&first.id, first.start, last.end)?;
        check_range(&first.id, start_sector, end_sector)?;

        Ok(PlannedPartition {
            number,
            kind: PartitionKind::Extended,
            id: None,
            label: None,
            type_code: TypeCode::Mbr(mbr::EXTENDED),
            fs_type: None,
            start_sector,
            end_sector,
            bootable: false,
        })
    }

    fn bounds(
        &self,
        id: &str,
        start: Size,
        end: Size,
    ) -> Result<(u64, Option<u64>), ValidationError> {
        if start.is_unspecified() {
            return Err(ValidationError::size(
                "0",
                format!("partition '{}': start offset must be explicit", id),
            ));
        }
        let start_bytes = start.bytes()?;
        self.check_fits(id, start_bytes)?;
        let start_sector = self.geometry.aligned_sector(start_bytes)?;

        let end_sector = if end.is_unspecified() {
            None
        } else {
            let end_bytes = end.bytes()?;
            self.check_fits(id, end_bytes)?;
            // The boundary sector itself belongs to the next partition.
            Some(self.geometry.aligned_sector(end_bytes)?.saturating_sub(1))
        };

        Ok((start_sector, end_sector))
    }

    fn check_fits(&self, id: &str, bytes: u64) -> Result<(), ValidationError> {
        if self.disk_bytes > 0 && bytes > self.disk_bytes {
            return Err(ValidationError::TooLarge {
                id: id.to_string(),
                end: bytes,
                disk: self.disk_bytes,
            });
        }
        Ok(())
    }
}

fn check_range(id: &str, start: u64, end: Option<u64>) -> Result<(), ValidationError> {
    match end {
        Some(end) if end <= start => Err(ValidationError::EmptyRange {
            id: id.to_string(),
            start,
            end,
        }),
        _ => Ok(()),
    }
}

fn mbr_type(part: &PartitionSpec) -> u8 {
    if part.fs_type == FsType::LinuxSwap || part.type_name == Some(PartitionType::LinuxSwap) {
        mbr::LINUX_SWAP
    } else {
        mbr::LINUX
    }
}

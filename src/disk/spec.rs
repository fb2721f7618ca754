//! Abstract disk layout as written in an image template.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parttype::PartitionType;
use super::size::Size;
use crate::error::ValidationError;

/// Partition table kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum TableKind {
    Gpt,
    Mbr,
}

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Gpt => "gpt",
            TableKind::Mbr => "mbr",
        }
    }

    /// Label name understood by sfdisk.
    pub fn sfdisk_label(self) -> &'static str {
        match self {
            TableKind::Gpt => "gpt",
            TableKind::Mbr => "dos",
        }
    }
}

impl FromStr for TableKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt" => Ok(TableKind::Gpt),
            "mbr" => Ok(TableKind::Mbr),
            other => Err(ValidationError::UnsupportedTableKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for TableKind {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TableKind> for String {
    fn from(kind: TableKind) -> String {
        kind.name().to_string()
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Filesystems the formatter knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum FsType {
    Fat32,
    Fat16,
    Vfat,
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    LinuxSwap,
}

impl FsType {
    pub fn name(self) -> &'static str {
        match self {
            FsType::Fat32 => "fat32",
            FsType::Fat16 => "fat16",
            FsType::Vfat => "vfat",
            FsType::Ext2 => "ext2",
            FsType::Ext3 => "ext3",
            FsType::Ext4 => "ext4",
            FsType::Xfs => "xfs",
            FsType::LinuxSwap => "linux-swap",
        }
    }

    pub fn is_fat(self) -> bool {
        matches!(self, FsType::Fat32 | FsType::Fat16 | FsType::Vfat)
    }
}

impl FromStr for FsType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fat32" => Ok(FsType::Fat32),
            "fat16" => Ok(FsType::Fat16),
            "vfat" => Ok(FsType::Vfat),
            "ext2" => Ok(FsType::Ext2),
            "ext3" => Ok(FsType::Ext3),
            "ext4" => Ok(FsType::Ext4),
            "xfs" => Ok(FsType::Xfs),
            "linux-swap" => Ok(FsType::LinuxSwap),
            other => Err(ValidationError::UnsupportedFsType(other.to_string())),
        }
    }
}

impl TryFrom<String> for FsType {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FsType> for String {
    fn from(fs: FsType) -> String {
        fs.name().to_string()
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One partition of a [`DiskSpec`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSpec {
    /// Stable key, unique within the disk.
    pub id: String,
    /// Display name, written as the GPT partition label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<PartitionType>,
    /// Explicit GPT type GUID; wins over `type_name`.
    #[serde(default, rename = "typeGUID", skip_serializing_if = "Option::is_none")]
    pub type_guid: Option<Uuid>,
    pub fs_type: FsType,
    pub start: Size,
    /// `"0"` extends the partition to the end of the usable space.
    pub end: Size,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Consumed by the OS installer and bootloader configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
}

impl PartitionSpec {
    pub fn new(id: &str, fs_type: FsType, start: Size, end: Size) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            type_name: None,
            type_guid: None,
            fs_type,
            start,
            end,
            flags: Vec::new(),
            mount_point: None,
        }
    }

    pub fn with_type(mut self, type_name: PartitionType) -> Self {
        self.type_name = Some(type_name);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flags.push(flag.to_string());
        self
    }

    pub fn with_mount_point(mut self, mount_point: &str) -> Self {
        self.mount_point = Some(mount_point.to_string());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// GPT label: the name, or the id when no name is given.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Resolved GPT type GUID. The explicit override always wins.
    pub fn resolved_guid(&self) -> Option<Uuid> {
        self.type_guid
            .or_else(|| self.type_name.map(PartitionType::guid))
    }
}

/// A disk layout: total size, table kind, ordered partitions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    #[serde(default)]
    pub name: String,
    pub size: Size,
    pub partition_table_type: TableKind,
    /// Target device for direct installs; raw image builds ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub partitions: Vec<PartitionSpec>,
}

impl DiskSpec {
    /// Checks that need no device: unique ids, parseable sizes, a partition list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.partitions.is_empty() {
            return Err(ValidationError::NoPartitions(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for part in &self.partitions {
            if !seen.insert(part.id.as_str()) {
                return Err(ValidationError::DuplicateId(part.id.clone()));
            }
            part.start.bytes()?;
            part.end.bytes()?;
        }
        self.size.bytes()?;
        Ok(())
    }

    pub fn partition(&self, id: &str) -> Option<&PartitionSpec> {
        self.partitions.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPT_JSON: &str = r#"{
        "name": "default",
        "size": "2GiB",
        "partitionTableType": "gpt",
        "partitions": [
            {"id": "boot", "name": "EFI", "type": "esp", "fsType": "fat32",
             "start": "1MiB", "end": "513MiB", "flags": ["boot"], "mountPoint": "/boot/efi"},
            {"id": "rootfs", "type": "linux-root", "fsType": "ext4",
             "start": "513MiB", "end": "0", "mountPoint": "/"}
        ]
    }"#;

    #[test]
    fn test_parse_gpt_disk() {
        let disk: DiskSpec = serde_json::from_str(GPT_JSON).unwrap();
        assert_eq!(disk.partition_table_type, TableKind::Gpt);
        assert_eq!(disk.partitions.len(), 2);

        let boot = disk.partition("boot").unwrap();
        assert_eq!(boot.fs_type, FsType::Fat32);
        assert_eq!(boot.label(), "EFI");
        assert!(boot.has_flag("boot"));
        assert_eq!(
            boot.resolved_guid().unwrap().to_string(),
            "c12a7328-f81f-11d2-ba4b-00a0c93ec93b"
        );

        let root = disk.partition("rootfs").unwrap();
        assert!(root.end.is_unspecified());
        assert_eq!(root.label(), "rootfs");
        disk.validate().unwrap();
    }

    #[test]
    fn test_guid_override_wins() {
        let part: PartitionSpec = serde_json::from_str(
            r#"{"id": "data", "type": "linux-home", "typeGUID": "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
                "fsType": "xfs", "start": "1GiB", "end": "0"}"#,
        )
        .unwrap();
        assert_eq!(part.resolved_guid(), Some(PartitionType::Linux.guid()));
    }

    #[test]
    fn test_unknown_fs_type_rejected() {
        let err = serde_json::from_str::<PartitionSpec>(
            r#"{"id": "x", "fsType": "btrfs", "start": "1MiB", "end": "0"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported filesystem type: btrfs"));
    }

    #[test]
    fn test_unknown_table_kind_rejected() {
        assert_eq!(
            "apm".parse::<TableKind>(),
            Err(ValidationError::UnsupportedTableKind("apm".into()))
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut disk: DiskSpec = serde_json::from_str(GPT_JSON).unwrap();
        disk.partitions[1].id = "boot".to_string();
        assert_eq!(
            disk.validate(),
            Err(ValidationError::DuplicateId("boot".into()))
        );
    }

    #[test]
    fn test_empty_partition_list_rejected() {
        let mut disk: DiskSpec = serde_json::from_str(GPT_JSON).unwrap();
        disk.partitions.clear();
        assert!(matches!(
            disk.validate(),
            Err(ValidationError::NoPartitions(_))
        ));
    }

    #[test]
    fn test_yaml_integer_size_is_mib() {
        let disk: DiskSpec = serde_yaml::from_str(
            "size: 4096\npartitionTableType: mbr\npartitions:\n  - id: root\n    fsType: ext4\n    start: 1\n    end: \"0\"\n",
        )
        .unwrap();
        assert_eq!(disk.size, Size::mib(4096));
        assert_eq!(disk.partitions[0].start, Size::mib(1));
    }
}

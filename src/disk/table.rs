//! sfdisk invocations for table creation, partition append and delete.
//!
//! These build the [`Cmd`]s only. [`super::ops::SystemDiskOps`] runs them.

use std::path::Path;

use super::parttype::TypeCode;
use super::plan::PlannedPartition;
use super::spec::TableKind;
use crate::process::Cmd;

/// Script that writes an empty label, replacing whatever table was there.
pub fn label_script(kind: TableKind) -> String {
    format!("label: {}\n", kind.sfdisk_label())
}

/// One sfdisk script line for an appended partition.
///
/// ```text
/// start=2048, size=1048575, type=C12A7328-F81F-11D2-BA4B-00A0C93EC93B, name="EFI"
/// start=616449, type=83, bootable
/// ```
///
/// `size` is omitted for partitions that run to the end of the disk.
pub fn entry_script(entry: &PlannedPartition) -> String {
    let mut fields = vec![format!("start={}", entry.start_sector)];

    if let Some(size) = entry.size_sectors() {
        fields.push(format!("size={}", size));
    }

    match entry.type_code {
        TypeCode::Gpt(Some(guid)) => {
            fields.push(format!("type={}", guid.hyphenated().to_string().to_uppercase()))
        }
        TypeCode::Gpt(None) => {}
        TypeCode::Mbr(code) => fields.push(format!("type={:x}", code)),
    }

    if let Some(label) = &entry.label {
        fields.push(format!("name=\"{}\"", label.replace('"', "")));
    }

    if entry.bootable {
        fields.push("bootable".to_string());
    }

    let mut line = fields.join(", ");
    line.push('\n');
    line
}

pub fn create_table_cmd(disk: &Path, kind: TableKind) -> Cmd {
    Cmd::new("sfdisk")
        .arg_path(disk)
        .stdin(label_script(kind))
        .error_msg(format!("failed to create {} partition table", kind))
}

/// `--no-reread` because the kernel is told about the change by [`refresh_cmd`].
pub fn append_cmd(disk: &Path, entry: &PlannedPartition) -> Cmd {
    Cmd::new("sfdisk")
        .args(["--no-reread", "--append"])
        .arg_path(disk)
        .stdin(entry_script(entry))
        .error_msg(format!("failed to append partition {}", entry.number))
}

/// Ask the kernel to re-read the table so partition device nodes appear.
pub fn refresh_cmd(disk: &Path) -> Cmd {
    Cmd::new("partx")
        .arg("-u")
        .arg_path(disk)
        .error_msg("failed to refresh partition table")
}

pub fn delete_cmd(disk: &Path, number: u32) -> Cmd {
    Cmd::new("sfdisk")
        .arg("--delete")
        .arg_path(disk)
        .arg(number.to_string())
        .error_msg(format!("failed to delete partition {}", number))
}

/// Drop the kernel's view of a deleted partition.
pub fn forget_cmd(disk: &Path, number: u32) -> Cmd {
    Cmd::new("partx")
        .args(["-d", "--nr"])
        .arg(number.to_string())
        .arg_path(disk)
        .error_msg(format!("failed to remove partition {} from kernel", number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::parttype::{mbr, PartitionType};
    use crate::disk::plan::PartitionKind;
    use crate::disk::spec::FsType;

    fn entry(type_code: TypeCode) -> PlannedPartition {
        PlannedPartition {
            number: 1,
            kind: PartitionKind::Primary,
            id: Some("boot".into()),
            label: None,
            type_code,
            fs_type: Some(FsType::Fat32),
            start_sector: 2048,
            end_sector: Some(1_050_623),
            bootable: false,
        }
    }

    #[test]
    fn test_label_scripts() {
        assert_eq!(label_script(TableKind::Gpt), "label: gpt\n");
        assert_eq!(label_script(TableKind::Mbr), "label: dos\n");
    }

    #[test]
    fn test_gpt_entry_script() {
        let mut e = entry(TypeCode::Gpt(Some(PartitionType::Esp.guid())));
        e.label = Some("EFI".into());
        assert_eq!(
            entry_script(&e),
            "start=2048, size=1048575, type=C12A7328-F81F-11D2-BA4B-00A0C93EC93B, name=\"EFI\"\n"
        );
    }

    #[test]
    fn test_gpt_entry_without_type_or_end() {
        let mut e = entry(TypeCode::Gpt(None));
        e.end_sector = None;
        e.label = Some("root".into());
        assert_eq!(entry_script(&e), "start=2048, name=\"root\"\n");
    }

    #[test]
    fn test_mbr_entry_script() {
        let mut e = entry(TypeCode::Mbr(mbr::LINUX));
        e.bootable = true;
        assert_eq!(entry_script(&e), "start=2048, size=1048575, type=83, bootable\n");

        let ext = entry(TypeCode::Mbr(mbr::EXTENDED));
        assert!(entry_script(&ext).contains("type=5"));
    }

    #[test]
    fn test_label_quotes_are_stripped() {
        let mut e = entry(TypeCode::Gpt(None));
        e.label = Some("my \"disk\"".into());
        assert!(entry_script(&e).contains("name=\"my disk\""));
    }

    #[test]
    fn test_command_lines() {
        let disk = Path::new("/dev/loop0");
        assert_eq!(create_table_cmd(disk, TableKind::Gpt).command_line(), "sfdisk /dev/loop0");
        assert_eq!(
            append_cmd(disk, &entry(TypeCode::Gpt(None))).command_line(),
            "sfdisk --no-reread --append /dev/loop0"
        );
        assert_eq!(refresh_cmd(disk).command_line(), "partx -u /dev/loop0");
        assert_eq!(delete_cmd(disk, 2).command_line(), "sfdisk --delete /dev/loop0 2");
        assert_eq!(forget_cmd(disk, 2).command_line(), "partx -d --nr 2 /dev/loop0");
    }
}

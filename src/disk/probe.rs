//! Device path conventions and read-only disk probes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DiskError, Result, ValidationError};
use crate::process::{Cmd, CommandResult};

/// sfdisk's stderr for a disk without any label.
const NO_TABLE_MARKER: &str = "does not contain a recognized partition table";

/// Device node of partition `number` on `disk`.
///
/// Loop and NVMe disk names already end in a digit, so their partitions
/// take a `p` separator: `/dev/loop0p2`, `/dev/nvme0n1p2`, but `/dev/sdb2`.
pub fn partition_device_path(disk: &Path, number: u32) -> PathBuf {
    let disk = disk.to_string_lossy();
    if disk.contains("loop") || disk.contains("nvme") {
        PathBuf::from(format!("{}p{}", disk, number))
    } else {
        PathBuf::from(format!("{}{}", disk, number))
    }
}

/// `/dev/sdb` -> `sdb`. Anything outside `/dev/` is rejected.
pub fn disk_name_from_path(disk: &Path) -> std::result::Result<String, ValidationError> {
    let invalid = || ValidationError::DiskPath(disk.display().to_string());
    let name = disk.strip_prefix("/dev").map_err(|_| invalid())?;
    match name.to_str() {
        Some(name) if !name.is_empty() && !name.contains('/') => Ok(name.to_string()),
        _ => Err(invalid()),
    }
}

/// `/dev/loop3p2` -> `/dev/loop3`. Returns `None` for non-partition paths.
pub fn loop_parent(partition: &str) -> Option<&str> {
    let (parent, number) = partition.rsplit_once('p')?;
    let is_loop_disk = parent
        .strip_prefix("/dev/loop")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    let is_number = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
    (is_loop_disk && is_number).then_some(parent)
}

#[derive(Debug, Deserialize)]
struct SfdiskDump {
    partitiontable: SfdiskTable,
}

#[derive(Debug, Deserialize)]
struct SfdiskTable {
    #[serde(default)]
    partitions: Vec<serde_json::Value>,
}

pub fn has_table_cmd(disk: &Path) -> Cmd {
    Cmd::new("sfdisk").arg("--json").arg_path(disk).allow_fail()
}

/// Interpret `sfdisk --json <disk>`.
///
/// A table counts as present when it holds at least one partition. An
/// empty label is cheap to overwrite and needs no wipe.
pub fn parse_has_table(disk: &Path, result: &CommandResult) -> Result<bool> {
    if !result.success() {
        if result.stderr.contains(NO_TABLE_MARKER) {
            return Ok(false);
        }
        return Err(DiskError::io(
            format!("failed to probe partition table on {}", disk.display()),
            result.stderr_trimmed(),
        ));
    }
    let dump: SfdiskDump = serde_json::from_str(&result.stdout).map_err(|e| {
        DiskError::io(format!("failed to parse sfdisk output for {}", disk.display()), e)
    })?;
    Ok(!dump.partitiontable.partitions.is_empty())
}

pub const DISKSTATS_PATH: &str = "/proc/diskstats";

/// Whether any device whose name starts with `disk_name` has I/O in flight,
/// according to `/proc/diskstats`.
pub fn io_busy(disk_name: &str) -> Result<bool> {
    io_busy_in(Path::new(DISKSTATS_PATH), disk_name)
}

/// [`io_busy`] against a diskstats file at `stats_path`.
pub fn io_busy_in(stats_path: &Path, disk_name: &str) -> Result<bool> {
    let stats = fs::read_to_string(stats_path)
        .map_err(|e| DiskError::io(format!("failed to read {}", stats_path.display()), e))?;
    Ok(diskstats_busy(&stats, disk_name))
}

/// Column layout: major minor name, then stats; the 12th field overall is
/// the count of I/Os currently in progress.
fn diskstats_busy(stats: &str, disk_name: &str) -> bool {
    stats.lines().any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields.len() > 11
            && fields[2].starts_with(disk_name)
            && fields[11].parse::<u64>().is_ok_and(|n| n > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn result(code: i32, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_partition_device_path() {
        assert_eq!(partition_device_path(Path::new("/dev/loop0"), 2), Path::new("/dev/loop0p2"));
        assert_eq!(partition_device_path(Path::new("/dev/sdb"), 2), Path::new("/dev/sdb2"));
        assert_eq!(
            partition_device_path(Path::new("/dev/nvme0n1"), 1),
            Path::new("/dev/nvme0n1p1")
        );
    }

    #[test]
    fn test_disk_name_from_path() {
        assert_eq!(disk_name_from_path(Path::new("/dev/sdb")).unwrap(), "sdb");
        assert_eq!(disk_name_from_path(Path::new("/dev/loop7")).unwrap(), "loop7");
        assert!(disk_name_from_path(Path::new("/tmp/disk.raw")).is_err());
        assert!(disk_name_from_path(Path::new("/dev")).is_err());
        assert!(disk_name_from_path(Path::new("/dev/mapper/root")).is_err());
    }

    #[test]
    fn test_loop_parent() {
        assert_eq!(loop_parent("/dev/loop3p2"), Some("/dev/loop3"));
        assert_eq!(loop_parent("/dev/loop12p10"), Some("/dev/loop12"));
        assert_eq!(loop_parent("/dev/loop3"), None);
        assert_eq!(loop_parent("/dev/sdb2"), None);
        assert_eq!(loop_parent("/dev/nvme0n1p2"), None);
    }

    #[test]
    fn test_no_label_means_no_table() {
        let r = result(1, "", "sfdisk: /dev/loop0: does not contain a recognized partition table\n");
        assert!(!parse_has_table(Path::new("/dev/loop0"), &r).unwrap());
    }

    #[test]
    fn test_other_probe_failure_is_io() {
        let r = result(1, "", "sfdisk: cannot open /dev/loop9: No such file or directory\n");
        assert!(matches!(
            parse_has_table(Path::new("/dev/loop9"), &r),
            Err(DiskError::Io { .. })
        ));
    }

    #[test]
    fn test_table_with_partitions() {
        let json = r#"{"partitiontable": {"label": "gpt", "device": "/dev/loop0", "unit": "sectors",
            "partitions": [{"node": "/dev/loop0p1", "start": 2048, "size": 1048575}]}}"#;
        assert!(parse_has_table(Path::new("/dev/loop0"), &result(0, json, "")).unwrap());

        let empty = r#"{"partitiontable": {"label": "dos", "device": "/dev/loop0", "unit": "sectors"}}"#;
        assert!(!parse_has_table(Path::new("/dev/loop0"), &result(0, empty, "")).unwrap());
    }

    #[test]
    fn test_diskstats_busy() {
        let stats = "\
   7       0 loop0 100 0 800 10 0 0 0 0 0 20 10 0 0 0 0
   7       1 loop1 100 0 800 10 0 0 0 0 3 20 10 0 0 0 0
   8      16 sdb 5 0 40 1 0 0 0 0 0 1 1 0 0 0 0
";
        assert!(!diskstats_busy(stats, "loop0"));
        assert!(diskstats_busy(stats, "loop1"));
        assert!(!diskstats_busy(stats, "sdb"));
        assert!(!diskstats_busy(stats, "nvme0n1"));
    }

    #[test]
    fn test_io_busy_reads_stats_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("diskstats");
        fs::write(
            &path,
            "   7       3 loop3 1 0 8 0 0 0 0 0 0 0 0 0 0 0 0\n   7       4 loop4p1 1 0 8 0 0 0 0 0 2 0 0 0 0 0 0\n",
        )
        .unwrap();

        assert!(!io_busy_in(&path, "loop3").unwrap());
        assert!(io_busy_in(&path, "loop4").unwrap());
        assert!(matches!(
            io_busy_in(&dir.path().join("missing"), "loop3"),
            Err(DiskError::Io { .. })
        ));
    }
}

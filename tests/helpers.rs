//! Shared test utilities for rawimg tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use rawimg::artifact::{ImageConverter, OsInstaller};
use rawimg::disk::blkid::BlockDevice;
use rawimg::disk::{
    DiskGeometry, DiskOps, DiskSpec, FsType, LoopInfo, PartitionAssignment, PartitionSpec,
    PartitionType, PlannedPartition, Size, TableKind,
};
use rawimg::error::{DiskError, Result};

/// Test environment with a temporary work directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Where raw images are written
    pub work_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let work_dir = temp_dir.path().join("imagebuild");
        fs::create_dir_all(&work_dir).expect("Failed to create work dir");
        Self {
            _temp_dir: temp_dir,
            work_dir,
        }
    }
}

/// One recorded [`DiskOps`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Allocate(PathBuf, u64),
    HasTable(PathBuf),
    Wipe(PathBuf),
    Geometry(PathBuf),
    CreateTable(PathBuf, TableKind),
    Append(u32),
    Refresh(PathBuf),
    Delete(u32),
    Forget(u32),
    Format(PathBuf, FsType),
    SwapOn(PathBuf),
    LoopAttach(PathBuf),
    LoopDetach(PathBuf),
    LoopList,
    Blkid(PathBuf, String),
    Lsblk(PathBuf),
}

/// Recording [`DiskOps`] with scripted failures.
pub struct FakeDiskOps {
    pub calls: RefCell<Vec<Call>>,
    pub geometry: DiskGeometry,
    pub has_table: bool,
    pub loop_device: String,
    pub fail_append: Option<u32>,
    pub fail_format: Option<u32>,
    pub fail_delete: Option<u32>,
    pub fail_detach: bool,
    /// Fail the refresh that follows appending this partition.
    pub fail_refresh: Option<u32>,
    pub fail_forget: Option<u32>,
    /// blkid values by tag name.
    pub blkid_values: HashMap<String, String>,
    pub block_devices: Vec<BlockDevice>,
    pub loop_devices: Vec<LoopInfo>,
    /// Appended entries, so tests can look at sectors and types.
    pub appended: RefCell<Vec<PlannedPartition>>,
    pub detached: Cell<u32>,
    pub last_appended: Cell<u32>,
}

impl Default for FakeDiskOps {
    fn default() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            geometry: DiskGeometry::classic(),
            has_table: false,
            loop_device: "/dev/loop0".to_string(),
            fail_append: None,
            fail_format: None,
            fail_delete: None,
            fail_detach: false,
            fail_refresh: None,
            fail_forget: None,
            blkid_values: HashMap::new(),
            block_devices: Vec::new(),
            loop_devices: Vec::new(),
            appended: RefCell::new(Vec::new()),
            detached: Cell::new(0),
            last_appended: Cell::new(0),
        }
    }
}

impl FakeDiskOps {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn appended_numbers(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Append(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_numbers(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn formatted(&self) -> Vec<(PathBuf, FsType)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Format(dev, fs) => Some((dev, fs)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn detach_count(&self) -> u32 {
        self.detached.get()
    }
}

fn scripted(what: &str) -> DiskError {
    DiskError::io(what.to_string(), "scripted failure")
}

fn partition_number(device: &Path) -> Option<u32> {
    let s = device.to_string_lossy();
    let digits: String = s
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

impl DiskOps for FakeDiskOps {
    fn allocate(&self, path: &Path, bytes: u64) -> Result<()> {
        self.record(Call::Allocate(path.to_path_buf(), bytes));
        // Sparse: only the length matters.
        let file = fs::File::create(path).map_err(|e| DiskError::io("allocate", e))?;
        file.set_len(bytes).map_err(|e| DiskError::io("allocate", e))?;
        Ok(())
    }

    fn has_partition_table(&self, disk: &Path) -> Result<bool> {
        self.record(Call::HasTable(disk.to_path_buf()));
        Ok(self.has_table)
    }

    fn wipe(&self, disk: &Path) -> Result<()> {
        self.record(Call::Wipe(disk.to_path_buf()));
        Ok(())
    }

    fn geometry(&self, disk: &Path) -> Result<DiskGeometry> {
        self.record(Call::Geometry(disk.to_path_buf()));
        Ok(self.geometry)
    }

    fn create_table(&self, disk: &Path, kind: TableKind) -> Result<()> {
        self.record(Call::CreateTable(disk.to_path_buf(), kind));
        Ok(())
    }

    fn append_partition(&self, _disk: &Path, entry: &PlannedPartition) -> Result<()> {
        self.record(Call::Append(entry.number));
        self.last_appended.set(entry.number);
        if self.fail_append == Some(entry.number) {
            return Err(scripted("append"));
        }
        self.appended.borrow_mut().push(entry.clone());
        Ok(())
    }

    fn refresh(&self, disk: &Path) -> Result<()> {
        self.record(Call::Refresh(disk.to_path_buf()));
        if self.fail_refresh == Some(self.last_appended.get()) {
            return Err(scripted("refresh"));
        }
        Ok(())
    }

    fn delete_partition(&self, _disk: &Path, number: u32) -> Result<()> {
        self.record(Call::Delete(number));
        if self.fail_delete == Some(number) {
            return Err(scripted("delete"));
        }
        Ok(())
    }

    fn forget_partition(&self, _disk: &Path, number: u32) -> Result<()> {
        self.record(Call::Forget(number));
        if self.fail_forget == Some(number) {
            return Err(scripted("forget"));
        }
        Ok(())
    }

    fn format(&self, device: &Path, fs: FsType) -> Result<()> {
        self.record(Call::Format(device.to_path_buf(), fs));
        if self.fail_format.is_some() && self.fail_format == partition_number(device) {
            return Err(scripted("format"));
        }
        Ok(())
    }

    fn activate_swap(&self, device: &Path) -> Result<()> {
        self.record(Call::SwapOn(device.to_path_buf()));
        Ok(())
    }

    fn loop_attach(&self, image: &Path) -> Result<String> {
        self.record(Call::LoopAttach(image.to_path_buf()));
        Ok(format!("{}\n", self.loop_device))
    }

    fn loop_detach(&self, device: &Path) -> Result<()> {
        self.record(Call::LoopDetach(device.to_path_buf()));
        self.detached.set(self.detached.get() + 1);
        if self.fail_detach {
            return Err(scripted("detach"));
        }
        Ok(())
    }

    fn loop_list(&self, device: Option<&Path>) -> Result<Vec<LoopInfo>> {
        self.record(Call::LoopList);
        Ok(self
            .loop_devices
            .iter()
            .filter(|l| device.map_or(true, |d| Path::new(&l.name) == d))
            .cloned()
            .collect())
    }

    fn blkid_tag(&self, device: &Path, tag: &str) -> Result<String> {
        self.record(Call::Blkid(device.to_path_buf(), tag.to_string()));
        // blkid prints the value followed by a newline.
        Ok(self
            .blkid_values
            .get(tag)
            .map(|v| format!("{}\n", v))
            .unwrap_or_default())
    }

    fn lsblk(&self, disk: &Path) -> Result<Vec<BlockDevice>> {
        self.record(Call::Lsblk(disk.to_path_buf()));
        Ok(self.block_devices.clone())
    }
}

/// Installer that records what it was handed.
pub struct RecordingInstaller {
    pub version: String,
    pub fail: bool,
    pub seen: Option<PartitionAssignment>,
}

impl RecordingInstaller {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            fail: false,
            seen: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("unused")
        }
    }
}

impl OsInstaller for RecordingInstaller {
    fn install(&mut self, assignment: &PartitionAssignment) -> anyhow::Result<String> {
        self.seen = Some(assignment.clone());
        if self.fail {
            anyhow::bail!("installer exited with status 1");
        }
        Ok(self.version.clone())
    }
}

/// Converter that records the raw path and optionally fails.
#[derive(Default)]
pub struct RecordingConverter {
    pub fail: bool,
    pub seen: Option<PathBuf>,
}

impl ImageConverter for RecordingConverter {
    fn convert(&mut self, raw: &Path) -> anyhow::Result<Vec<PathBuf>> {
        self.seen = Some(raw.to_path_buf());
        if self.fail {
            anyhow::bail!("qemu-img convert failed");
        }
        Ok(vec![raw.with_extension("qcow2")])
    }
}

fn size(s: &str) -> Size {
    s.parse().expect("valid size")
}

/// 2GiB GPT disk: 512MiB ESP, ext4 root to the end.
pub fn gpt_2gib_spec() -> DiskSpec {
    DiskSpec {
        name: "default".to_string(),
        size: size("2GiB"),
        partition_table_type: TableKind::Gpt,
        path: None,
        partitions: vec![
            PartitionSpec::new("boot", FsType::Fat32, size("1MiB"), size("513MiB"))
                .with_type(PartitionType::Esp)
                .with_flag("boot")
                .with_mount_point("/boot"),
            PartitionSpec::new("root", FsType::Ext4, size("513MiB"), size("0"))
                .with_type(PartitionType::LinuxRoot)
                .with_mount_point("/"),
        ],
    }
}

/// 4GiB MBR disk with five partitions, forcing the extended chain.
pub fn mbr_five_spec() -> DiskSpec {
    DiskSpec {
        name: "legacy".to_string(),
        size: size("4GiB"),
        partition_table_type: TableKind::Mbr,
        path: None,
        partitions: vec![
            PartitionSpec::new("boot", FsType::Ext2, size("1MiB"), size("257MiB"))
                .with_flag("boot")
                .with_mount_point("/boot"),
            PartitionSpec::new("swap", FsType::LinuxSwap, size("257MiB"), size("769MiB")),
            PartitionSpec::new("root", FsType::Ext4, size("769MiB"), size("2GiB"))
                .with_mount_point("/"),
            PartitionSpec::new("var", FsType::Ext4, size("2GiB"), size("3GiB"))
                .with_mount_point("/var"),
            PartitionSpec::new("home", FsType::Xfs, size("3GiB"), size("0"))
                .with_mount_point("/home"),
        ],
    }
}

/// Five-partition GPT layout for rollback tests.
pub fn gpt_five_spec() -> DiskSpec {
    let parts = ["a", "b", "c", "d", "e"];
    DiskSpec {
        name: "five".to_string(),
        size: size("1GiB"),
        partition_table_type: TableKind::Gpt,
        path: None,
        partitions: parts
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let start = format!("{}MiB", 1 + i * 100);
                let end = format!("{}MiB", 1 + (i + 1) * 100);
                PartitionSpec::new(id, FsType::Ext4, size(&start), size(&end))
            })
            .collect(),
    }
}

pub fn block_device(name: &str, kind: &str, fstype: Option<&str>, label: Option<&str>) -> BlockDevice {
    BlockDevice {
        name: name.to_string(),
        path: format!("/dev/{}", name),
        parttype: None,
        fstype: fstype.map(str::to_string),
        uuid: None,
        mountpoint: None,
        partuuid: None,
        partlabel: label.map(str::to_string),
        kind: kind.to_string(),
    }
}

pub fn loop_info(name: &str, back_file: Option<&str>) -> LoopInfo {
    LoopInfo {
        name: name.to_string(),
        back_file: back_file.map(str::to_string),
        sizelimit: 0,
        offset: 0,
        autoclear: true,
        ro: false,
        dio: true,
    }
}

//! Raw disk image builder.
//!
//! Build process:
//! 1. Validate the layout (no side effects)
//! 2. Allocate `<name>.raw` in the work directory
//! 3. Attach it to a loop device with partition scanning
//! 4. Partition and format through the loop device
//! 5. Hand the partition assignment to the OS installer
//! 6. Detach the loop device, whatever the installer did
//! 7. Rename to `<name>-<version>.raw`
//! 8. Hand the final file to the image converter
//!
//! A converter failure leaves the versioned raw file in place.
//!
//! Any failure moves the build to [`BuildState::Failed`]. Partitions are
//! rolled back by [`create_partitions`], the loop device is always detached,
//! and the working file is removed unless the build is told to keep it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::disk::geometry::DiskGeometry;
use crate::disk::loopdev::{allocate_raw_file, LoopDevice};
use crate::disk::ops::DiskOps;
use crate::disk::partition::{create_partitions, PartitionAssignment};
use crate::disk::plan;
use crate::disk::spec::DiskSpec;
use crate::error::{DiskError, Result, RollbackError};
use crate::timing::Timer;

/// Installs the operating system into the mounted-to-be partitions.
pub trait OsInstaller {
    /// Populate the partitions and return the installed OS version, which
    /// becomes part of the final file name.
    fn install(&mut self, assignment: &PartitionAssignment) -> anyhow::Result<String>;
}

/// Converts or compresses the finished raw image.
pub trait ImageConverter {
    /// Returns every artifact produced, which may include `raw` itself.
    fn convert(&mut self, raw: &Path) -> anyhow::Result<Vec<PathBuf>>;
}

/// Where a raw image build currently stands.
///
/// `Created` is entered once the working file exists. A failed allocation
/// goes straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Created,
    LoopAttached,
    Partitioned,
    Formatted,
    Handoff,
    LoopDetached,
    Finalized,
    Failed,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildState::Finalized | BuildState::Failed)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Created => "created",
            BuildState::LoopAttached => "loop-attached",
            BuildState::Partitioned => "partitioned",
            BuildState::Formatted => "formatted",
            BuildState::Handoff => "handoff",
            BuildState::LoopDetached => "loop-detached",
            BuildState::Finalized => "finalized",
            BuildState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A finished build.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Versioned raw file, `<name>-<version>.raw`.
    pub path: PathBuf,
    pub version: String,
    pub assignment: PartitionAssignment,
    /// What the converter produced.
    pub artifacts: Vec<PathBuf>,
}

/// Drives one raw image build through [`BuildState`].
pub struct RawImageBuilder<'a> {
    ops: &'a dyn DiskOps,
    work_dir: PathBuf,
    keep_failed_image: bool,
    state: BuildState,
    history: Vec<BuildState>,
}

impl<'a> RawImageBuilder<'a> {
    pub fn new(ops: &'a dyn DiskOps, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ops,
            work_dir: work_dir.into(),
            keep_failed_image: false,
            state: BuildState::Created,
            history: Vec::new(),
        }
    }

    /// Leave the working file in place after a failure, for diagnosis.
    pub fn keep_failed_image(mut self, keep: bool) -> Self {
        self.keep_failed_image = keep;
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Every state entered by the current or last build, in order.
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    /// Working file path for an image called `name`.
    pub fn raw_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(raw_file_name(name))
    }

    pub fn final_path(&self, name: &str, version: &str) -> PathBuf {
        self.work_dir.join(versioned_file_name(name, version))
    }

    pub fn build(
        &mut self,
        name: &str,
        disk: &DiskSpec,
        installer: &mut dyn OsInstaller,
        converter: &mut dyn ImageConverter,
    ) -> Result<RawImage> {
        self.state = BuildState::Created;
        self.history.clear();

        let timer = Timer::start(&format!("raw image {}", name));
        let result = self.run(name, disk, installer, converter);
        match &result {
            Ok(image) => {
                info!(path = %image.path.display(), "raw image finalized");
                timer.finish();
            }
            Err(e) => {
                error!(image = name, state = %self.state, error = %e, "raw image build failed");
                self.enter(BuildState::Failed);
            }
        }
        result
    }

    fn run(
        &mut self,
        name: &str,
        disk: &DiskSpec,
        installer: &mut dyn OsInstaller,
        converter: &mut dyn ImageConverter,
    ) -> Result<RawImage> {
        // Layout errors must surface before the file exists. The real
        // geometry is only known once the loop device is up.
        plan::plan(disk, DiskGeometry::classic())?;

        let raw_path = self.raw_path(name);
        allocate_raw_file(self.ops, &raw_path, disk.size)?;
        let mut raw_file = WorkingFile::new(&raw_path, self.keep_failed_image);
        self.enter(BuildState::Created);

        let mut loop_dev = LoopDevice::attach(self.ops, &raw_path)?;
        self.enter(BuildState::LoopAttached);

        let assignment = match create_partitions(self.ops, loop_dev.path(), disk) {
            Ok(assignment) => assignment,
            Err(e) => {
                let rollback = detach_for_rollback(&mut loop_dev);
                return Err(e.with_rollback(rollback));
            }
        };
        // Each partition is formatted right after it is created, so both
        // states are reached when the session returns.
        self.enter(BuildState::Partitioned);
        self.enter(BuildState::Formatted);

        self.enter(BuildState::Handoff);
        let installed = installer
            .install(&assignment)
            .map_err(|e| DiskError::external("OS installation", e));

        let version = match (installed, loop_dev.detach()) {
            (Ok(version), Ok(())) => version,
            (Ok(_), Err(detach)) => return Err(detach),
            (Err(install), Ok(())) => return Err(install),
            (Err(install), Err(detach)) => {
                warn!(error = %detach, "failed to detach loop device after installer failure");
                return Err(install.with_rollback(vec![RollbackError::new(
                    format!("detach {}", loop_dev.path().display()),
                    detach,
                )]));
            }
        };
        self.enter(BuildState::LoopDetached);

        let final_path = self.final_path(name, &version);
        fs::rename(&raw_path, &final_path).map_err(|e| {
            DiskError::io(
                format!(
                    "failed to rename {} to {}",
                    raw_path.display(),
                    final_path.display()
                ),
                e,
            )
        })?;
        raw_file.disarm();

        let artifacts = converter
            .convert(&final_path)
            .map_err(|e| DiskError::external("image conversion", e))?;
        self.enter(BuildState::Finalized);

        Ok(RawImage {
            path: final_path,
            version,
            assignment,
            artifacts,
        })
    }

    fn enter(&mut self, next: BuildState) {
        info!(from = %self.state, to = %next, "raw image state");
        self.state = next;
        self.history.push(next);
    }
}

pub fn raw_file_name(name: &str) -> String {
    format!("{}.raw", name)
}

pub fn versioned_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.raw", name, version)
}

fn detach_for_rollback(loop_dev: &mut LoopDevice<'_>) -> Vec<RollbackError> {
    match loop_dev.detach() {
        Ok(()) => Vec::new(),
        Err(e) => {
            warn!(device = %loop_dev.path().display(), error = %e, "failed to detach loop device during rollback");
            vec![RollbackError::new(
                format!("detach {}", loop_dev.path().display()),
                e,
            )]
        }
    }
}

/// The working raw file, removed on drop unless disarmed or kept.
struct WorkingFile {
    path: PathBuf,
    keep: bool,
    armed: bool,
}

impl WorkingFile {
    fn new(path: &Path, keep: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            keep,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WorkingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.keep {
            warn!(path = %self.path.display(), "keeping raw image of failed build");
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove raw image");
            }
        }
    }
}

/// Installer that installs nothing and reports a fixed version.
pub struct NoopInstaller {
    pub version: String,
}

impl OsInstaller for NoopInstaller {
    fn install(&mut self, assignment: &PartitionAssignment) -> anyhow::Result<String> {
        info!(partitions = assignment.len(), "no installer configured, leaving partitions empty");
        Ok(self.version.clone())
    }
}

/// Converter that keeps the raw file as the only artifact.
pub struct RawPassthrough;

impl ImageConverter for RawPassthrough {
    fn convert(&mut self, raw: &Path) -> anyhow::Result<Vec<PathBuf>> {
        Ok(vec![raw.to_path_buf()])
    }
}

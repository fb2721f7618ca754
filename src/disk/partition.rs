//! Partition creation with rollback.
//!
//! [`create_partitions`] is the whole flow for one disk: validate and plan
//! with no side effects, wipe a stale table, write a fresh label, then
//! append, refresh and format one partition at a time. If any partition
//! fails, every partition created earlier in the same run is deleted again,
//! newest first, before the error is returned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::ops::DiskOps;
use super::plan::{self, PartitionPlan, PlannedPartition};
use super::probe::partition_device_path;
use super::spec::{DiskSpec, FsType};
use crate::error::{DiskError, Result, RollbackError, ValidationError};

/// One created and formatted partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedPartition {
    pub id: String,
    pub number: u32,
    pub device: PathBuf,
    pub fs_type: FsType,
    pub mount_point: Option<String>,
}

/// Partition id to device path, in creation order.
///
/// Only ever handed out complete: a failed run returns an error instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionAssignment {
    entries: Vec<AssignedPartition>,
}

impl PartitionAssignment {
    pub fn entries(&self) -> &[AssignedPartition] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AssignedPartition> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn device(&self, id: &str) -> Option<&Path> {
        self.get(id).map(|e| e.device.as_path())
    }

    /// Device backing `mount_point`, e.g. `/` for the root filesystem.
    pub fn device_for_mount(&self, mount_point: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|e| e.mount_point.as_deref() == Some(mount_point))
            .map(|e| e.device.as_path())
    }

    pub fn to_map(&self) -> BTreeMap<String, PathBuf> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.device.clone()))
            .collect()
    }

    fn push(&mut self, entry: AssignedPartition) {
        self.entries.push(entry);
    }
}

/// Partition `disk` according to `spec` and format every partition.
pub fn create_partitions(
    ops: &dyn DiskOps,
    disk: &Path,
    spec: &DiskSpec,
) -> Result<PartitionAssignment> {
    PartitionSession::prepare(ops, disk, spec)?.apply()
}

/// A validated plan bound to one disk, not yet written.
pub struct PartitionSession<'a> {
    ops: &'a dyn DiskOps,
    disk: PathBuf,
    spec: &'a DiskSpec,
    plan: PartitionPlan,
}

impl<'a> PartitionSession<'a> {
    /// Validate, read the geometry and plan. Nothing is written.
    pub fn prepare(ops: &'a dyn DiskOps, disk: &Path, spec: &'a DiskSpec) -> Result<Self> {
        if disk.as_os_str().is_empty() {
            return Err(ValidationError::MissingDiskPath.into());
        }
        spec.validate()?;

        let geometry = ops.geometry(disk)?;
        let plan = plan::plan(spec, geometry)?;

        Ok(Self {
            ops,
            disk: disk.to_path_buf(),
            spec,
            plan,
        })
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Write the table, then create and format each partition in order.
    pub fn apply(self) -> Result<PartitionAssignment> {
        let ops = self.ops;
        let disk = self.disk.as_path();

        if ops.has_partition_table(disk)? {
            info!(disk = %disk.display(), "existing partition table found, wiping");
            ops.wipe(disk)?;
        }

        ops.create_table(disk, self.plan.table)?;
        info!(disk = %disk.display(), table = %self.plan.table, "partition table created");

        let mut rollback = PartitionRollback::new(ops, disk);
        let mut assignment = PartitionAssignment::default();

        for entry in &self.plan.entries {
            match self.create_one(entry, &mut rollback) {
                Ok(Some(assigned)) => assignment.push(assigned),
                Ok(None) => {}
                Err(e) => {
                    let failures = rollback.rollback();
                    return Err(DiskError::partition(entry.number, e).with_rollback(failures));
                }
            }
        }

        rollback.disarm();
        Ok(assignment)
    }

    fn create_one(
        &self,
        entry: &PlannedPartition,
        rollback: &mut PartitionRollback<'_>,
    ) -> Result<Option<AssignedPartition>> {
        let disk = self.disk.as_path();
        info!(
            number = entry.number,
            kind = %entry.kind,
            name = entry.display_name(),
            start = entry.start_sector,
            end = ?entry.end_sector,
            "creating partition"
        );

        self.ops.append_partition(disk, entry)?;
        rollback.record(entry.number);
        self.ops.refresh(disk)?;

        let (Some(id), Some(fs_type)) = (&entry.id, entry.fs_type) else {
            // Extended container: nothing to format or hand out.
            return Ok(None);
        };

        let device = partition_device_path(disk, entry.number);
        self.ops.format(&device, fs_type)?;
        if fs_type == FsType::LinuxSwap {
            self.ops.activate_swap(&device)?;
        }
        info!(device = %device.display(), fs = %fs_type, "partition formatted");

        Ok(Some(AssignedPartition {
            id: id.clone(),
            number: entry.number,
            device,
            fs_type,
            mount_point: self
                .spec
                .partition(id)
                .and_then(|p| p.mount_point.clone()),
        }))
    }
}

/// Partitions created so far in one run, deleted again unless disarmed.
struct PartitionRollback<'a> {
    ops: &'a dyn DiskOps,
    disk: &'a Path,
    created: Vec<u32>,
}

impl<'a> PartitionRollback<'a> {
    fn new(ops: &'a dyn DiskOps, disk: &'a Path) -> Self {
        Self {
            ops,
            disk,
            created: Vec::new(),
        }
    }

    fn record(&mut self, number: u32) {
        self.created.push(number);
    }

    fn disarm(&mut self) {
        self.created.clear();
    }

    /// Delete every recorded partition, newest first.
    ///
    /// A failed delete is collected and the rest still run. Failing to drop
    /// the kernel's view afterwards is only a warning: the table on disk
    /// has already changed.
    fn rollback(&mut self) -> Vec<RollbackError> {
        let mut failures = Vec::new();
        while let Some(number) = self.created.pop() {
            info!(number, "rolling back partition");
            if let Err(e) = self.ops.delete_partition(self.disk, number) {
                warn!(number, error = %e, "failed to delete partition during rollback");
                failures.push(RollbackError::new(format!("delete partition {}", number), e));
                continue;
            }
            if let Err(e) = self.ops.forget_partition(self.disk, number) {
                warn!(number, error = %e, "partition deleted but kernel view not updated");
            }
        }
        failures
    }
}

impl Drop for PartitionRollback<'_> {
    fn drop(&mut self) {
        if !self.created.is_empty() {
            for failure in self.rollback() {
                warn!(error = %failure, "rollback on drop");
            }
        }
    }
}

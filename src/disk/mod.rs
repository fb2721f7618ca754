//! Disk layout: sizes, geometry, partition types, planning and creation.
//!
//! Leaves first:
//! - [`size`]: human size strings
//! - [`geometry`]: sector and block sizes from sysfs
//! - [`parttype`]: partition type names, GPT GUIDs, MBR codes
//! - [`spec`]: the template-facing layout description
//! - [`plan`]: aligned sectors and the MBR extended/logical chain
//! - [`table`], [`format`]: sfdisk and mkfs invocations
//! - [`loopdev`]: loopback attachment
//! - [`ops`]: the capability trait everything above runs through
//! - [`partition`]: creation with rollback

pub mod blkid;
pub mod format;
pub mod geometry;
pub mod loopdev;
pub mod ops;
pub mod partition;
pub mod parttype;
pub mod plan;
pub mod probe;
pub mod size;
pub mod spec;
pub mod table;

pub use geometry::DiskGeometry;
pub use loopdev::{LoopDevice, LoopInfo};
pub use ops::{DiskOps, SystemDiskOps};
pub use partition::{create_partitions, AssignedPartition, PartitionAssignment, PartitionSession};
pub use parttype::{PartitionType, TypeCode};
pub use plan::{PartitionKind, PartitionPlan, PlannedPartition};
pub use probe::partition_device_path;
pub use size::Size;
pub use spec::{DiskSpec, FsType, PartitionSpec, TableKind};

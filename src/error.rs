//! Error types for the partitioning engine.
//!
//! Errors are categorized by when they can happen:
//! - [`ValidationError`]: malformed input, always detected before any device is touched
//! - [`DiskError::Io`]: an external tool invocation failed
//! - [`RollbackError`]: a cleanup step failed while recovering from another error
//!
//! ```ignore
//! match rawimg::disk::create_partitions(&ops, disk, &spec) {
//!     Err(DiskError::Validation(_)) => { /* fix the template */ }
//!     Err(DiskError::RolledBack { source, rollback }) => { /* primary + cleanup failures */ }
//!     _ => {}
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, DiskError>;

// ============================================================================
// Top-Level Error
// ============================================================================

#[derive(Debug, Error)]
pub enum DiskError {
    /// Input rejected before any destructive operation.
    #[error("invalid disk layout: {0}")]
    Validation(#[from] ValidationError),

    /// An external tool (sfdisk, losetup, mkfs, ...) failed.
    #[error("{context}: {message}")]
    Io { context: String, message: String },

    /// Creating or formatting a single partition failed.
    #[error("failed to create partition {number}: {source}")]
    Partition {
        number: u32,
        #[source]
        source: Box<DiskError>,
    },

    /// The external installer or converter reported a failure.
    #[error("{stage} failed: {message}")]
    External { stage: &'static str, message: String },

    /// Primary failure plus the cleanup steps that also failed afterwards.
    #[error("{source}{}", RollbackSummary(.rollback))]
    RolledBack {
        #[source]
        source: Box<DiskError>,
        rollback: Vec<RollbackError>,
    },
}

impl DiskError {
    /// Build an `Io` error from any displayable cause, keeping the full chain.
    pub fn io(context: impl Into<String>, err: impl fmt::Display) -> Self {
        DiskError::Io {
            context: context.into(),
            message: format!("{:#}", err),
        }
    }

    pub fn partition(number: u32, err: DiskError) -> Self {
        DiskError::Partition {
            number,
            source: Box::new(err),
        }
    }

    pub fn external(stage: &'static str, err: impl fmt::Display) -> Self {
        DiskError::External {
            stage,
            message: format!("{:#}", err),
        }
    }

    /// Attach rollback failures to a primary error. Returns the error
    /// unchanged when nothing failed during cleanup.
    pub fn with_rollback(self, rollback: Vec<RollbackError>) -> Self {
        if rollback.is_empty() {
            return self;
        }
        match self {
            DiskError::RolledBack {
                source,
                rollback: mut existing,
            } => {
                existing.extend(rollback);
                DiskError::RolledBack {
                    source,
                    rollback: existing,
                }
            }
            primary => DiskError::RolledBack {
                source: Box::new(primary),
                rollback,
            },
        }
    }

    /// The primary error, looking through any rollback wrapper.
    pub fn primary(&self) -> &DiskError {
        match self {
            DiskError::RolledBack { source, .. } => source.primary(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.primary(), DiskError::Validation(_))
    }

    /// Cleanup failures reported alongside the primary error.
    pub fn rollback_errors(&self) -> &[RollbackError] {
        match self {
            DiskError::RolledBack { rollback, .. } => rollback,
            _ => &[],
        }
    }
}

struct RollbackSummary<'a>(&'a [RollbackError]);

impl fmt::Display for RollbackSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in self.0 {
            write!(f, "; {}", err)?;
        }
        Ok(())
    }
}

// ============================================================================
// Validation Errors (template/user-fixable)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("size '{input}': {reason}")]
    Size { input: String, reason: String },

    #[error("unsupported filesystem type: {0}")]
    UnsupportedFsType(String),

    #[error("partition type not found: {0}")]
    UnknownTypeName(String),

    #[error("partition GUID not found: {0}")]
    UnknownTypeGuid(String),

    #[error("unsupported partition table type: {0}")]
    UnsupportedTableKind(String),

    #[error("unknown partition type: {0}")]
    UnknownPartitionKind(String),

    #[error("duplicate partition id: {0}")]
    DuplicateId(String),

    #[error("partition '{id}': end sector {end} does not exceed start sector {start}")]
    EmptyRange { id: String, start: u64, end: u64 },

    #[error("partition '{id}' ends at {end} bytes, beyond disk size {disk} bytes")]
    TooLarge { id: String, end: u64, disk: u64 },

    #[error("no target disk path specified")]
    MissingDiskPath,

    #[error("failed to extract disk name from path: {0}")]
    DiskPath(String),

    #[error("disk '{0}' has no partitions")]
    NoPartitions(String),

    #[error("invalid disk geometry: {0}")]
    Geometry(String),
}

impl ValidationError {
    pub fn size(input: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Size {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Rollback Errors
// ============================================================================

/// A cleanup step that failed while recovering from an earlier error.
///
/// Logged as a warning and reported next to the primary error, never in
/// place of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rollback {step} failed: {message}")]
pub struct RollbackError {
    pub step: String,
    pub message: String,
}

impl RollbackError {
    pub fn new(step: impl Into<String>, err: impl fmt::Display) -> Self {
        RollbackError {
            step: step.into(),
            message: err.to_string(),
        }
    }
}

//! rawimg - partitions and formats raw disk images for OS image builds.
//!
//! Turns a disk layout from an image template into an aligned GPT or MBR
//! layout on a loop-backed raw file, formats every partition, and hands the
//! partition-to-device map to an OS installer.
//!
//! See [`artifact::raw`] for the build flow and [`disk`] for the pieces.

pub mod artifact;
pub mod commands;
pub mod config;
pub mod disk;
pub mod error;
pub mod preflight;
pub mod process;
pub mod template;
pub mod timing;

pub use error::{DiskError, Result, RollbackError, ValidationError};

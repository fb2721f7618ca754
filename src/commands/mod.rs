//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build a raw image from a template
//! - `plan` - Print the planned partition table
//! - `loopdev` - Inspect and detach loop devices
//! - `preflight` - Run preflight checks
//! - `show` - Display information

pub mod build;
pub mod loopdev;
pub mod plan;
mod preflight;
pub mod show;

pub use build::cmd_build;
pub use loopdev::cmd_loop;
pub use plan::cmd_plan;
pub use preflight::cmd_preflight;
pub use show::cmd_show;

//! Build artifacts.
//!
//! - `raw` - loop-backed raw disk image, partitioned and formatted

pub mod raw;

pub use raw::{
    BuildState, ImageConverter, NoopInstaller, OsInstaller, RawImage, RawImageBuilder,
    RawPassthrough,
};

//! Build command - builds a raw disk image from a template.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::artifact::raw::{NoopInstaller, RawImageBuilder, RawPassthrough};
use crate::config::Config;
use crate::disk::SystemDiskOps;
use crate::template::ImageTemplate;

/// Version used when neither the template nor the command line names one.
pub const DEFAULT_VERSION: &str = "dev";

/// Execute the build command.
pub fn cmd_build(
    template: &Path,
    output_dir: Option<PathBuf>,
    version: Option<String>,
    config: &Config,
) -> Result<()> {
    let template = ImageTemplate::load(template)?;
    let work_dir = output_dir.unwrap_or_else(|| config.work_dir.clone());
    let version = version
        .or_else(|| template.image.version.clone())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    println!("=== Building raw image '{}' ===\n", template.image.name);
    println!("  Work directory: {}", work_dir.display());
    println!("  Table: {}", template.disk.partition_table_type);
    println!("  Size: {}", template.disk.size);
    println!();

    let ops = SystemDiskOps::from_config(config);
    let mut builder =
        RawImageBuilder::new(&ops, &work_dir).keep_failed_image(config.keep_failed_image);
    let mut installer = NoopInstaller { version };
    let mut converter = RawPassthrough;

    let image = builder.build(
        &template.image.name,
        &template.disk,
        &mut installer,
        &mut converter,
    )?;

    println!("Partitions:");
    for entry in image.assignment.entries() {
        println!(
            "  {:<12} #{:<2} {:<12} {}",
            entry.id,
            entry.number,
            entry.fs_type,
            entry.device.display()
        );
    }
    println!();
    println!("=== Raw image complete ===");
    for artifact in &image.artifacts {
        println!("  {}", artifact.display());
    }

    Ok(())
}

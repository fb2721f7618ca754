//! Loop command - inspect and detach loop devices.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::disk::blkid;
use crate::disk::loopdev::{self, LoopInfo};
use crate::disk::probe;
use crate::disk::SystemDiskOps;

/// Loop target for the loop command.
pub enum LoopTarget {
    /// List attached loop devices
    List,
    /// Show one loop device
    Info(String),
    /// Detach one loop device
    Detach(String),
}

/// Execute the loop command.
pub fn cmd_loop(target: LoopTarget, config: &Config) -> Result<()> {
    let ops = SystemDiskOps::from_config(config);
    match target {
        LoopTarget::List => {
            let devices = loopdev::list_all(&ops)?;
            if devices.is_empty() {
                println!("No loop devices attached.");
            }
            for info in &devices {
                println!("{}", describe(info));
            }
        }
        LoopTarget::Info(device) => {
            let info = loopdev::info(&ops, Path::new(&device))
                .with_context(|| format!("Failed to query {}", device))?;
            println!("{}", describe(&info));
            println!("  offset: {}", info.offset);
            println!("  sizelimit: {}", info.sizelimit);
            println!("  read-only: {}", info.ro);
            println!("  autoclear: {}", info.autoclear);
            for part in blkid::partitions(&ops, Path::new(&device))? {
                println!(
                    "  {}  {}  {}",
                    part.path,
                    part.fstype.as_deref().unwrap_or("-"),
                    part.partlabel.as_deref().unwrap_or("-")
                );
            }
        }
        LoopTarget::Detach(device) => {
            let name = probe::disk_name_from_path(Path::new(&device))?;
            if probe::io_busy(&name)? {
                bail!("{} has I/O in flight, not detaching", device);
            }
            loopdev::detach(&ops, Path::new(&device))
                .with_context(|| format!("Failed to detach {}", device))?;
            println!("Detached {}", device);
        }
    }
    Ok(())
}

fn describe(info: &LoopInfo) -> String {
    format!(
        "{}  {}{}",
        info.name,
        info.back_file.as_deref().unwrap_or("(no backing file)"),
        if info.dio { "  [dio]" } else { "" }
    )
}

//! Show command - displays information.

use anyhow::Result;

use crate::config::Config;
use crate::disk::PartitionType;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the partition type table
    Types,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Types => {
            println!("Partition types:");
            for t in PartitionType::ALL {
                println!("  {:<16} {}", t, t.guid());
            }
        }
    }
    Ok(())
}

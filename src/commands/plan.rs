//! Plan command - prints the partition table a template would produce.

use anyhow::Result;
use std::path::Path;

use crate::disk::plan::{self, PartitionPlan};
use crate::disk::{DiskGeometry, TypeCode};
use crate::template::ImageTemplate;

/// Execute the plan command. Touches no device.
pub fn cmd_plan(template: &Path, logical: u64, physical: u64) -> Result<()> {
    let template = ImageTemplate::load(template)?;
    let geometry = DiskGeometry::new(logical, physical);
    let plan = plan::plan(&template.disk, geometry)?;

    println!(
        "Plan for '{}' ({} table, {}/{} byte sectors):\n",
        template.image.name, plan.table, logical, physical
    );
    for line in render(&plan) {
        println!("  {}", line);
    }
    Ok(())
}

/// One line per planned entry.
pub fn render(plan: &PartitionPlan) -> Vec<String> {
    plan.entries
        .iter()
        .map(|e| {
            let end = e
                .end_sector
                .map(|s| s.to_string())
                .unwrap_or_else(|| "end".to_string());
            let type_code = match e.type_code {
                TypeCode::Gpt(Some(guid)) => guid.to_string(),
                TypeCode::Gpt(None) => "default".to_string(),
                TypeCode::Mbr(code) => format!("0x{:02x}", code),
            };
            let fs = e.fs_type.map(|f| f.name()).unwrap_or("-");
            let boot = if e.bootable { " boot" } else { "" };
            format!(
                "#{:<2} {:<8} {:<12} {:>10} {:>10}  {:<10} {}{}",
                e.number,
                e.kind,
                e.display_name(),
                e.start_sector,
                end,
                fs,
                type_code,
                boot
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::spec::{DiskSpec, FsType, PartitionSpec, TableKind};

    #[test]
    fn test_render_mbr_chain() {
        let parts = (0..5)
            .map(|i| {
                PartitionSpec::new(
                    &format!("p{}", i),
                    FsType::Ext4,
                    format!("{}MiB", 1 + i * 10).parse().unwrap(),
                    format!("{}MiB", 11 + i * 10).parse().unwrap(),
                )
            })
            .collect();
        let disk = DiskSpec {
            name: "test".into(),
            size: "1GiB".parse().unwrap(),
            partition_table_type: TableKind::Mbr,
            path: None,
            partitions: parts,
        };
        let lines = render(&plan::plan(&disk, DiskGeometry::classic()).unwrap());
        assert_eq!(lines.len(), 6);
        assert!(lines[3].contains("extended"));
        assert!(lines[3].contains("0x05"));
        assert!(lines[5].starts_with("#6"));
    }
}

//! Image template loading.
//!
//! A template is YAML or JSON, picked by file extension. It is either a
//! bare disk layout, or an image description with the layout under `disk`:
//!
//! ```yaml
//! image:
//!   name: minimal
//!   version: "1.0"
//! disk:
//!   size: 2GiB
//!   partitionTableType: gpt
//!   partitions:
//!     - id: boot
//!       type: esp
//!       fsType: fat32
//!       start: 1MiB
//!       end: 513MiB
//!       mountPoint: /boot/efi
//!     - id: rootfs
//!       type: linux-root
//!       fsType: ext4
//!       start: 513MiB
//!       end: "0"
//!       mountPoint: /
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::disk::spec::DiskSpec;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageTemplate {
    pub image: ImageInfo,
    pub disk: DiskSpec,
}

impl ImageTemplate {
    /// Load a template file. A bare layout takes its image name from the
    /// layout's `name`, or the file stem when that is empty.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        let format = TemplateFormat::from_path(path)?;
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());

        Self::parse(&content, format, &fallback_name)
            .with_context(|| format!("Invalid template {}", path.display()))
    }

    pub fn parse(content: &str, format: TemplateFormat, fallback_name: &str) -> Result<Self> {
        let value: serde_json::Value = match format {
            TemplateFormat::Yaml => serde_yaml::from_str(content)?,
            TemplateFormat::Json => serde_json::from_str(content)?,
        };

        if value.get("disk").is_some() {
            return Ok(serde_json::from_value(value)?);
        }

        let mut disk: DiskSpec = serde_json::from_value(value)?;
        if disk.name.is_empty() {
            disk.name = fallback_name.to_string();
        }
        Ok(Self {
            image: ImageInfo {
                name: disk.name.clone(),
                version: None,
            },
            disk,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

impl TemplateFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(TemplateFormat::Yaml),
            Some("json") => Ok(TemplateFormat::Json),
            _ => bail!(
                "Unknown template format: {} (expected .yaml, .yml or .json)",
                path.display()
            ),
        }
    }
}

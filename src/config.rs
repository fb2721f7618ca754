//! Configuration management for rawimg.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default root of the sysfs block device tree.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/block";

/// Default log filter when neither `RUST_LOG` nor `RAWIMG_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// rawimg configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory raw images are built in
    pub work_dir: PathBuf,
    /// Root of the sysfs block tree used for geometry queries
    pub sysfs_root: PathBuf,
    /// Keep the raw file after a failed build
    pub keep_failed_image: bool,
    /// Default tracing filter
    pub log_level: String,
    /// Prefix privileged commands with sudo
    pub use_sudo: bool,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if let Ok(iter) = dotenvy::from_path_iter(&env_path) {
            for (key, value) in iter.flatten() {
                vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        vars.extend(std::env::vars());

        Self::from_vars(base_dir, &vars)
    }

    fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Self {
        let work_dir = vars
            .get("RAWIMG_WORK_DIR")
            .map(|s| absolute(base_dir, s))
            .unwrap_or_else(|| default_work_dir(base_dir));

        let sysfs_root = vars
            .get("RAWIMG_SYSFS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSFS_ROOT));

        let log_level = vars
            .get("RAWIMG_LOG")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            work_dir,
            sysfs_root,
            keep_failed_image: flag(vars, "RAWIMG_KEEP_FAILED_IMAGE"),
            log_level,
            use_sudo: flag(vars, "RAWIMG_USE_SUDO"),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  RAWIMG_WORK_DIR: {}", self.work_dir.display());
        println!("  RAWIMG_SYSFS_ROOT: {}", self.sysfs_root.display());
        println!("  RAWIMG_KEEP_FAILED_IMAGE: {}", self.keep_failed_image);
        println!("  RAWIMG_LOG: {}", self.log_level);
        println!("  RAWIMG_USE_SUDO: {}", self.use_sudo);
        if self.sysfs_root.is_dir() {
            println!("  sysfs: FOUND");
        } else {
            println!("  sysfs: NOT FOUND (geometry queries will fail)");
        }
    }
}

fn absolute(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn default_work_dir(base_dir: &Path) -> PathBuf {
    dirs::cache_dir()
        .map(|cache| cache.join("rawimg").join("imagebuild"))
        .unwrap_or_else(|| base_dir.join("imagebuild"))
}

fn flag(vars: &HashMap<String, String>, key: &str) -> bool {
    vars.get(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

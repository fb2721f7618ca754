//! Host tool availability checks.

use super::types::CheckResult;

/// Tools every raw image build shells out to, with the package providing them.
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("sfdisk", "util-linux", "Required to write partition tables"),
    ("partx", "util-linux", "Required to refresh the kernel partition view"),
    ("losetup", "util-linux", "Required to attach raw images"),
    ("wipefs", "util-linux", "Required to wipe stale partition tables"),
    ("fallocate", "util-linux", "Required to allocate raw image files"),
    ("blkid", "util-linux", "Required to read partition UUIDs"),
    ("lsblk", "util-linux", "Required to list block devices"),
    ("mkswap", "util-linux", "Required for swap partitions"),
    ("swapon", "util-linux", "Required for swap partitions"),
    ("mkfs", "util-linux", "Required to format partitions"),
    ("mkfs.ext4", "e2fsprogs", "Required for ext2/ext3/ext4 partitions"),
    ("mkfs.vfat", "dosfstools", "Required for FAT partitions"),
    ("mkfs.xfs", "xfsprogs", "Required for xfs partitions"),
    ("sync", "coreutils", "Required to flush after wiping"),
];

/// Needed only in some configurations.
pub const OPTIONAL_TOOLS: &[(&str, &str, &str)] = &[
    ("sudo", "sudo", "Required when RAWIMG_USE_SUDO is set"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (tool, package, purpose) in REQUIRED_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, true));
    }

    for (tool, package, purpose) in OPTIONAL_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, false));
    }

    results
}

/// Device operations need root, directly or through sudo.
pub fn check_privileges(use_sudo: bool) -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        CheckResult::pass_with("root privileges", "running as root")
    } else if use_sudo {
        CheckResult::warn(
            "root privileges",
            "not root; privileged commands will go through sudo",
        )
    } else {
        CheckResult::fail(
            "root privileges",
            "not root. Run as root or set RAWIMG_USE_SUDO=1",
        )
    }
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match which::which(tool) {
        Ok(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        Err(_) => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;

    #[test]
    fn test_missing_required_tool_fails() {
        let result = check_tool_exists("nonexistent_tool_12345", "nothing", "test", true);
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.details.unwrap().contains("Install 'nothing'"));
    }

    #[test]
    fn test_missing_optional_tool_warns() {
        let result = check_tool_exists("nonexistent_tool_12345", "nothing", "test", false);
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[test]
    fn test_present_tool_passes() {
        let result = check_tool_exists("sh", "bash", "test", true);
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[test]
    fn test_every_tool_checked() {
        let results = check_host_tools();
        assert_eq!(results.len(), REQUIRED_TOOLS.len() + OPTIONAL_TOOLS.len());
        assert!(results.iter().any(|r| r.name == "sfdisk"));
    }

    #[test]
    fn test_every_formatter_is_required() {
        for tool in ["mkfs", "mkfs.vfat", "mkfs.ext4", "mkfs.xfs", "mkswap"] {
            assert!(
                REQUIRED_TOOLS.iter().any(|(name, _, _)| *name == tool),
                "{} should be required",
                tool
            );
        }
    }
}

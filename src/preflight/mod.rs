//! Preflight checks for raw image builds.
//!
//! Verifies host tools and privileges before any device is touched.
//! Run with `rawimg preflight` to check everything is ready.

mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use host_tools::{check_host_tools, check_privileges, OPTIONAL_TOOLS, REQUIRED_TOOLS};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    tracing::info!("checking host tools");
    checks.extend(check_host_tools());

    tracing::info!("checking privileges");
    checks.push(check_privileges(config.use_sudo));

    if config.sysfs_root.is_dir() {
        checks.push(CheckResult::pass_with(
            "sysfs",
            &config.sysfs_root.display().to_string(),
        ));
    } else {
        checks.push(CheckResult::fail(
            "sysfs",
            &format!("{} not found, geometry cannot be read", config.sysfs_root.display()),
        ));
    }

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

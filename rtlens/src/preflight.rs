//! Pre-flight checks for rtlens
//!
//! Validates system requirements before attempting to touch the sampler.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Minimum kernel version for the BPF map features the sampler relies on
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before loading the sampler object.
///
/// # Errors
/// Returns the first failing check with an actionable message.
pub fn run_preflight_checks(target_path: &str) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_binary_exists(target_path)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF map updates and
/// process_vm_readv against arbitrary targets.
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: rtlens requires root privileges to update sampler maps\n\
         and read target process memory.\n\n\
         Run with: sudo rtlens ..."
    );
}

/// Check if the kernel version is recent enough.
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..." - third token is the release
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some((major, minor)) = parse_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             rtlens requires Linux {}.{} or newer.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the target binary exists and is a regular file.
fn check_binary_exists(target_path: &str) -> Result<()> {
    let path = Path::new(target_path);
    if !path.exists() {
        bail!(
            "Binary not found: {target_path}\n\n\
             Make sure the path is correct and the binary exists."
        );
    }
    if !path.is_file() {
        bail!("Not a file: {target_path}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("6.1.0-arch1-1"), Some((6, 1)));
        assert_eq!(parse_release("5.15rc2.0"), Some((5, 15)));
        assert_eq!(parse_release("unknown"), None);
    }

    #[test]
    fn test_missing_binary_fails() {
        assert!(check_binary_exists("/no/such/binary").is_err());
    }
}

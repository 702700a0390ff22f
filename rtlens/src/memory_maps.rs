//! Load-bias discovery from /proc/<pid>/maps
//!
//! Position-independent executables are loaded at a randomized base address,
//! so every link-time virtual address in the image (section addresses,
//! static symbol addresses) is off by a per-process bias. The bias is the
//! lowest mapping start of the executable; fixed-position binaries need no
//! adjustment at all.

use crate::domain::Pid;
use crate::image::ElfImage;
use anyhow::{Context, Result};
use log::debug;
use std::fs;

/// Compute the additive load bias for `image` in process `pid`.
///
/// # Errors
/// Returns an error if /proc/<pid>/maps cannot be read or contains no
/// mapping of the binary.
pub fn load_bias(pid: Pid, binary_path: &str, image: &ElfImage) -> Result<u64> {
    if !image.is_position_independent() {
        return Ok(0);
    }

    let maps_path = format!("/proc/{}/maps", pid.0);
    let maps =
        fs::read_to_string(&maps_path).with_context(|| format!("Failed to read {maps_path}"))?;

    let base = lowest_mapping_start(&maps, binary_path)
        .with_context(|| format!("No mapping of {binary_path} in {maps_path}"))?;

    debug!("{binary_path} in {pid}: PIE base 0x{base:x}");
    Ok(base)
}

/// Scan maps content for the lowest start address mapping `binary_path`.
///
/// Line format: `start-end perms offset dev inode pathname`.
fn lowest_mapping_start(maps: &str, binary_path: &str) -> Option<u64> {
    let mut base: Option<u64> = None;

    for line in maps.lines() {
        if !line.ends_with(binary_path) {
            continue;
        }
        let range = line.split_whitespace().next()?;
        let (start, _end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        base = Some(base.map_or(start, |b| b.min(start)));
    }

    base
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d1c2a00000-55d1c2a40000 r--p 00000000 103:02 131  /usr/bin/target
55d1c2a40000-55d1c2c00000 r-xp 00040000 103:02 131  /usr/bin/target
7f2e10000000-7f2e10020000 r--p 00000000 103:02 999  /usr/lib/libc.so.6
ffffffffff600000-ffffffffff601000 --xp 00000000 00:00 0  [vsyscall]
";

    #[test]
    fn test_lowest_mapping_start() {
        let base = lowest_mapping_start(MAPS, "/usr/bin/target").unwrap();
        assert_eq!(base, 0x55d1_c2a0_0000);
    }

    #[test]
    fn test_unmapped_binary_is_none() {
        assert!(lowest_mapping_start(MAPS, "/usr/bin/other").is_none());
    }

    #[test]
    fn test_basename_does_not_match_suffix_of_other_paths() {
        // "target" alone must not match "/usr/bin/target"'s neighbors
        assert!(lowest_mapping_start(MAPS, "bin/libc.so.6").is_none());
    }
}

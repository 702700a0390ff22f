//! Host CPU topology facts
//!
//! Stateless fact gathering reported alongside profiles. The kernel exposes
//! CPU sets in comma/range list notation ("0-2,5-7"); the same notation is
//! used when reporting which CPUs a profile covered, so both directions of
//! the codec live here.

use anyhow::{Context, Result};
use std::fs;

/// Get the list of online CPU IDs from /sys/devices/system/cpu/online.
///
/// # Errors
/// Returns an error if /sys is unavailable or the list is malformed.
pub fn online_cpus() -> Result<Vec<u32>> {
    let content = fs::read_to_string("/sys/devices/system/cpu/online")
        .context("Failed to read /sys/devices/system/cpu/online")?;
    parse_cpu_list(content.trim())
}

/// Parse kernel cpu-list notation into an ascending list of CPU IDs.
///
/// `"0-2,5-7"` → `[0, 1, 2, 5, 6, 7]`; `"3"` → `[3]`.
///
/// # Errors
/// Returns an error on empty input or unparsable ranges.
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for part in list.split(',') {
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().context("Invalid range start")?;
            let end: u32 = end.trim().parse().context("Invalid range end")?;
            anyhow::ensure!(start <= end, "Range {part} is reversed");
            cpus.extend(start..=end);
        } else {
            cpus.push(part.trim().parse().context("Invalid CPU id")?);
        }
    }

    anyhow::ensure!(!cpus.is_empty(), "Empty CPU list");
    Ok(cpus)
}

/// Encode an ascending list of CPU IDs in kernel cpu-list notation.
///
/// Adjacent runs collapse to ranges: `[0, 1, 2, 5]` → `"0-2,5"`. The input
/// must be strictly ascending; the output round-trips through
/// [`parse_cpu_list`].
#[must_use]
pub fn format_cpu_list(cpus: &[u32]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;

    while i < cpus.len() {
        let start = cpus[i];
        let mut end = start;
        while i + 1 < cpus.len() && cpus[i + 1] == end + 1 {
            i += 1;
            end = cpus[i];
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
        i += 1;
    }

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_ranges() {
        assert_eq!(parse_cpu_list("3").unwrap(), vec![3]);
        assert_eq!(parse_cpu_list("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0-2,5-7").unwrap(), vec![0, 1, 2, 5, 6, 7]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cpu_list("").is_err());
        assert!(parse_cpu_list("a-b").is_err());
        assert!(parse_cpu_list("7-3").is_err());
    }

    #[test]
    fn test_format_scenarios() {
        // Scenario table mirrors the shapes the kernel itself produces
        let cases: &[(&[u32], &str)] = &[
            (&[3], "3"),
            (&[3, 5], "3,5"),
            (&[0, 1, 2, 3], "0-3"),
            (&[0, 1, 2, 5], "0-2,5"),
            (&[0, 1, 2, 5, 6, 7], "0-2,5-7"),
            (&[1, 2, 4, 6, 7], "1-2,4,6-7"),
            (&[1, 2, 4, 7], "1-2,4,7"),
            (&[0, 1, 3, 4, 6, 7], "0-1,3-4,6-7"),
        ];
        for (input, expected) in cases {
            assert_eq!(format_cpu_list(input), *expected, "input {input:?}");
        }
    }

    #[test]
    fn test_round_trip() {
        let sets: &[&[u32]] = &[
            &[0],
            &[0, 1, 2, 5, 6, 7],
            &[2, 4, 8, 16],
            &[0, 1, 2, 3, 4, 5, 6, 7],
            &[5, 9, 10, 11, 64],
        ];
        for set in sets {
            let encoded = format_cpu_list(set);
            let decoded = parse_cpu_list(&encoded).unwrap();
            assert_eq!(&decoded, set, "via {encoded:?}");
        }
    }

    #[test]
    fn test_online_cpus_on_linux() {
        // Relies on /sys being available (Linux only)
        let result = online_cpus();

        #[cfg(target_os = "linux")]
        {
            let cpus = result.unwrap();
            assert!(cpus.contains(&0), "CPU 0 should always be online");
        }

        #[cfg(not(target_os = "linux"))]
        assert!(result.is_err());
    }
}

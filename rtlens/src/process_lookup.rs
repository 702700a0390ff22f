//! Auto-detect process PID and binary path from a process name.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of process lookup.
#[derive(Debug)]
pub struct ProcessInfo {
    pub pid: i32,
    pub exe_path: PathBuf,
    pub command: String,
}

/// Find a process by name.
///
/// Searches `/proc` for processes whose command name (`/proc/<pid>/comm`) or
/// executable basename matches. Kernel threads and processes we cannot
/// inspect are skipped silently.
///
/// # Errors
/// - No processes found
/// - Multiple processes found (ambiguous)
pub fn find_process_by_name(name: &str) -> Result<ProcessInfo> {
    let mut matches: Vec<ProcessInfo> = Vec::new();

    for entry in fs::read_dir("/proc").context("Failed to read /proc")?.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };

        // No exe link means a kernel thread or a process we can't see
        let Ok(exe_path) = fs::read_link(format!("/proc/{pid}/exe")) else {
            continue;
        };

        let Ok(comm) = fs::read_to_string(format!("/proc/{pid}/comm")) else {
            continue;
        };
        let command = comm.trim_end().to_string();

        if matches_name(&command, &exe_path, name) {
            matches.push(ProcessInfo { pid, exe_path, command });
        }
    }

    match matches.len() {
        0 => bail!(
            "No process matching '{name}' found.\n\
             Check running processes with: ps aux | grep {name}"
        ),
        1 => Ok(matches.remove(0)),
        _ => {
            let list: Vec<String> =
                matches.iter().map(|m| format!("  {} ({})", m.pid, m.command)).collect();
            bail!(
                "Multiple processes match '{name}':\n{}\n\n\
                 Specify PID explicitly: rtlens --pid <PID>",
                list.join("\n")
            )
        }
    }
}

/// Resolve binary path from PID via `/proc/<pid>/exe`.
///
/// # Errors
/// Returns an error if the process doesn't exist or the link is unreadable.
pub fn resolve_exe_path(pid: i32) -> Result<PathBuf> {
    let exe_link = format!("/proc/{pid}/exe");
    fs::read_link(&exe_link).with_context(|| format!("Cannot read {exe_link}"))
}

/// Check whether a process matches the search pattern: exact on the comm
/// name or exe basename, substring as a fallback.
fn matches_name(command: &str, exe_path: &Path, pattern: &str) -> bool {
    let exe_basename = exe_path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    command == pattern
        || exe_basename == pattern
        || command.contains(pattern)
        || exe_basename.contains(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name() {
        let exe = Path::new("/usr/bin/my-server");
        assert!(matches_name("my-server", exe, "my-server"));
        assert!(matches_name("my-server", exe, "server"));
        assert!(!matches_name("my-server", exe, "other"));
    }

    #[test]
    fn test_resolve_own_exe() {
        #[allow(clippy::cast_possible_wrap)]
        let pid = std::process::id() as i32;
        let exe = resolve_exe_path(pid).unwrap();
        assert!(exe.is_absolute());
    }
}

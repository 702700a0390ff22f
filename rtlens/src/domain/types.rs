//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a raw address
//! where a PID is expected, and make function signatures more expressive.

use std::fmt;

/// Process ID
///
/// Represents a process ID in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(pid: i32) -> Self {
        #[allow(clippy::cast_sign_loss)]
        Pid(pid as u32)
    }
}

impl From<Pid> for i32 {
    fn from(pid: Pid) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        {
            pid.0 as i32
        }
    }
}

/// Runtime version string extracted from a binary (validated, non-empty)
///
/// Versions are opaque identifiers ordered by their string form; the
/// per-runtime offset tables decide how much of the string is significant
/// (e.g. Go offsets are keyed by minor series).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(String);

impl Version {
    /// Create a new version (panics if empty)
    ///
    /// Detectors must never report an empty version; "could not determine"
    /// is a `DetectionError`, not an empty string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        assert!(!version.is_empty(), "Version cannot be empty");
        Self(version)
    }

    /// Get the version as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::new(s)
    }
}

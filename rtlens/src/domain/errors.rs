//! Structured error types for rtlens
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! The taxonomy mirrors how failures propagate through classification and
//! attachment: "not this runtime" is never an error (detectors return
//! `Ok(None)`), while everything below is a typed value returned to the
//! caller and scoped to a single binary or process. A misclassified or
//! unattachable process must never take the agent down.

use super::types::{Pid, Version};
use crate::interpreter::RuntimeKind;
use thiserror::Error;

/// A read against a binary image or a live process failed.
///
/// Propagated unchanged through detection and attach; fatal to that one
/// operation only.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("short read at 0x{addr:x}: wanted {wanted} bytes, got {got}")]
    Short { addr: u64, wanted: usize, got: usize },

    #[error("address 0x{addr:x} is not covered by any loadable section")]
    Unmapped { addr: u64 },

    #[error("cannot read {len} bytes at 0x{addr:x} in process {pid}: {source}")]
    Process {
        pid: Pid,
        addr: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Evidence of a runtime exists but its signature or version is malformed.
///
/// Distinct from "not this runtime": callers log this and keep trying other
/// modules against the same binary.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("{kind} signature found in {file} but version is malformed: {reason}")]
    MalformedVersion { kind: RuntimeKind, file: String, reason: String },

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Classification-level failure from the module registry.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Runtime and version were identified, but no offset table exists.
    ///
    /// Logged distinctly from none-matched so operators can request support
    /// for the version.
    #[error("no offset table for {kind} version {version} (unsupported version)")]
    UnsupportedVersion { kind: RuntimeKind, version: Version },
}

/// The sampler handle rejected a registration call.
#[derive(Error, Debug)]
pub enum SamplerError {
    /// A live registration already exists for this (kind, pid) key.
    ///
    /// A second attach without an intervening detach is a caller error and
    /// is rejected rather than silently overwriting the live entry.
    #[error("{kind}/{pid} is already registered with the sampler")]
    AlreadyRegistered { kind: RuntimeKind, pid: Pid },

    /// No registration exists for this (kind, pid) key.
    ///
    /// Tolerated during detach: the kernel side may have dropped the entry
    /// on its own when it noticed the process exit.
    #[error("no sampler registration for {kind}/{pid}")]
    NotRegistered { kind: RuntimeKind, pid: Pid },

    #[error("offset record for {kind} is {len} bytes, exceeds blob capacity {max}")]
    BlobTooLarge { kind: RuntimeKind, len: usize, max: usize },

    #[error("sampler map update failed: {0}")]
    MapUpdate(String),
}

/// Attach failed; the instance was never created and no kernel-side state
/// was left behind. The caller decides whether to retry or abandon.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Detach-side failures.
#[derive(Error, Debug)]
pub enum DetachError {
    /// Detach was called on an instance that already reached the terminal
    /// state. Reported rather than ignored, since an ambiguous double-detach
    /// can mask leaked kernel state.
    #[error("instance {kind}/{pid} is already detached")]
    AlreadyDetached { kind: RuntimeKind, pid: Pid },

    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_version_display() {
        let err = LoaderError::UnsupportedVersion {
            kind: RuntimeKind::Go,
            version: Version::new("9.9.9"),
        };
        assert!(err.to_string().contains("9.9.9"));
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn test_already_detached_display() {
        let err = DetachError::AlreadyDetached { kind: RuntimeKind::Python, pid: Pid(4242) };
        assert_eq!(err.to_string(), "instance python/PID:4242 is already detached");
    }

    #[test]
    fn test_short_read_display() {
        let err = ReadError::Short { addr: 0x1000, wanted: 32, got: 7 };
        assert_eq!(err.to_string(), "short read at 0x1000: wanted 32 bytes, got 7");
    }
}

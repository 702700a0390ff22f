//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the per-process introspection blobs the agent registers with the
//! in-kernel sampler, plus the runtime-kind constants both sides key maps by.
//! All types use `#[repr(C)]` with explicit little-endian field packing so the
//! layout is identical on either side of the kernel boundary.
//!
//! ## Key Types
//!
//! - [`ProcData`] - Fixed-capacity blob stored in the sampler's per-runtime maps
//! - [`GoProcData`] - Goroutine-label extraction offsets for one Go version
//! - [`PyProcData`] - Thread-state/frame walking offsets for one CPython version

#![no_std]

// ============================================================================
// Runtime Kind Constants
// ============================================================================

/// Map key namespace for Go processes (userspace `RuntimeKind::Go`).
pub const RUNTIME_KIND_GO: u32 = 1;

/// Map key namespace for CPython processes (userspace `RuntimeKind::Python`).
pub const RUNTIME_KIND_PYTHON: u32 = 2;

/// Maximum serialized size of any per-runtime offset record.
///
/// The sampler-side maps store fixed-size values; a record larger than this
/// is rejected at registration time, never truncated.
pub const PROC_DATA_MAX: usize = 64;

// ============================================================================
// Sampler Map Value
// ============================================================================

/// Per-process introspection record, keyed by PID in the sampler's maps.
///
/// `bytes[..len]` holds the serialized runtime-specific offset record
/// ([`GoProcData`] or [`PyProcData`]); the remainder is zero padding so the
/// value is a fixed-size, `Pod`-safe map entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProcData {
    /// Number of meaningful bytes in `bytes`.
    pub len: u32,
    /// Padding for 8-byte alignment of `bytes` consumers.
    #[allow(clippy::pub_underscore_fields)]
    pub _pad: u32,
    /// Serialized offset record, zero-padded to `PROC_DATA_MAX`.
    pub bytes: [u8; PROC_DATA_MAX],
}

impl ProcData {
    /// Wrap a serialized offset record, zero-padding to capacity.
    ///
    /// Returns `None` if the record exceeds [`PROC_DATA_MAX`].
    #[must_use]
    pub fn from_slice(blob: &[u8]) -> Option<Self> {
        if blob.len() > PROC_DATA_MAX {
            return None;
        }
        let mut bytes = [0u8; PROC_DATA_MAX];
        bytes[..blob.len()].copy_from_slice(blob);
        #[allow(clippy::cast_possible_truncation)]
        Some(Self { len: blob.len() as u32, _pad: 0, bytes })
    }
}

// ============================================================================
// Go: goroutine label extraction offsets
// ============================================================================

/// Byte offsets into the Go runtime's internal structures needed to walk from
/// a thread's `g` to the current goroutine's label map.
///
/// All offsets are relative to their documented base structure; none require
/// load-bias adjustment (they index into heap objects, not static data).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GoProcData {
    /// Offset of `m` within `g`.
    pub g_m: u64,
    /// Offset of `curg` within `m`.
    pub m_curg: u64,
    /// Offset of `labels` within `g`.
    pub g_labels: u64,
    /// Offset of `count` within the label map's `hmap`.
    pub hmap_count: u64,
    /// Offset of `B` (log2 bucket count) within `hmap`.
    pub hmap_log2_bucket_count: u64,
    /// Offset of `buckets` within `hmap`.
    pub hmap_buckets: u64,
}

/// Serialized size of [`GoProcData`].
pub const GO_PROC_DATA_SIZE: usize = 48;

impl GoProcData {
    /// Serialize as little-endian u64 fields, in declaration order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; GO_PROC_DATA_SIZE] {
        let mut out = [0u8; GO_PROC_DATA_SIZE];
        let fields = [
            self.g_m,
            self.m_curg,
            self.g_labels,
            self.hmap_count,
            self.hmap_log2_bucket_count,
            self.hmap_buckets,
        ];
        for (i, f) in fields.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&f.to_le_bytes());
        }
        out
    }
}

// ============================================================================
// CPython: thread-state and frame walking offsets
// ============================================================================

/// Byte offsets into CPython's internal structures plus the process-specific
/// address of `_PyRuntime`.
///
/// `runtime_addr` is the only field that is not a pure struct offset: the
/// agent adds the executable's load bias before registration, so the sampler
/// always receives a ready-to-dereference virtual address.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PyProcData {
    /// Biased virtual address of `_PyRuntime` in the target process.
    pub runtime_addr: u64,
    /// Offset of the current thread-state pointer within `_PyRuntime`.
    pub tstate_current: u64,
    /// Offset of the current frame within the thread state.
    pub tstate_frame: u64,
    /// Offset of `f_back` within a frame object.
    pub frame_back: u64,
    /// Offset of `f_code` within a frame object.
    pub frame_code: u64,
    /// Offset of `co_name` within a code object.
    pub code_name: u64,
}

/// Serialized size of [`PyProcData`].
pub const PY_PROC_DATA_SIZE: usize = 48;

impl PyProcData {
    /// Serialize as little-endian u64 fields, in declaration order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PY_PROC_DATA_SIZE] {
        let mut out = [0u8; PY_PROC_DATA_SIZE];
        let fields = [
            self.runtime_addr,
            self.tstate_current,
            self.tstate_frame,
            self.frame_back,
            self.frame_code,
            self.code_name,
        ];
        for (i, f) in fields.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&f.to_le_bytes());
        }
        out
    }
}

// ============================================================================
// Userspace Support (aya map values)
// ============================================================================

#[cfg(feature = "user")]
use aya::Pod;

// Pod asserts the type is plain bytes with no padding holes observable by the
// kernel side; ProcData is repr(C) with explicit padding fields.
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ProcData {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_data_pads_to_capacity() {
        let blob = [0xAAu8; 12];
        let data = ProcData::from_slice(&blob).unwrap();
        assert_eq!(data.len, 12);
        assert_eq!(&data.bytes[..12], &blob);
        assert!(data.bytes[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn proc_data_rejects_oversized_blob() {
        let blob = [0u8; PROC_DATA_MAX + 1];
        assert!(ProcData::from_slice(&blob).is_none());
    }

    #[test]
    fn go_proc_data_packs_little_endian() {
        let offsets = GoProcData {
            g_m: 0x30,
            m_curg: 0xc0,
            g_labels: 0x168,
            hmap_count: 0,
            hmap_log2_bucket_count: 9,
            hmap_buckets: 16,
        };
        let bytes = offsets.to_bytes();
        assert_eq!(bytes.len(), GO_PROC_DATA_SIZE);
        assert_eq!(&bytes[..8], &0x30u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &0x168u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &16u64.to_le_bytes());
    }

    #[test]
    fn py_proc_data_packs_runtime_addr_first() {
        let offsets = PyProcData {
            runtime_addr: 0xdead_b000,
            tstate_current: 0x20,
            tstate_frame: 0x38,
            frame_back: 0x08,
            frame_code: 0x10,
            code_name: 0x70,
        };
        let bytes = offsets.to_bytes();
        assert_eq!(&bytes[..8], &0xdead_b000u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &0x70u64.to_le_bytes());
    }
}

//! CPython runtime module
//!
//! CPython 3.11+ exports `Py_Version`, a static `unsigned long` holding the
//! release in hex form (`major << 24 | minor << 16 | micro << 8 | level`).
//! Detection reads those four bytes straight from the image's static data -
//! no live process access required. A binary that exports `_PyRuntime` but
//! no decodable `Py_Version` clearly embeds the interpreter, so that case is
//! a detection error rather than a silent skip.
//!
//! Unlike Go, one field of the attachment record is position-dependent: the
//! static address of `_PyRuntime`. PIE interpreters load at a randomized
//! base, so attach adds the per-process load bias and verifies the biased
//! address is actually readable before handing the record to the sampler.

use crate::domain::{AttachError, DetectionError, Pid, Version};
use crate::image::BinaryImage;
use crate::interpreter::{RuntimeData, RuntimeKind, RuntimeModule};
use crate::remote::RemoteMemory;
use rtlens_common::PyProcData;

/// Exported on 3.11+; value is the release in hex form.
const VERSION_SYMBOL: &str = "Py_Version";
/// The interpreter's global runtime state; exported by every 3.x build.
const RUNTIME_SYMBOL: &str = "_PyRuntime";

// ============================================================================
// Offset Table Registry
// ============================================================================

/// Structure offsets for one 3.x series.
///
/// Offsets into `_PyRuntime`, the thread state and frame/code objects; the
/// frame layout changed in every series since the 3.11 frame rewrite, hence
/// one entry per minor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyOffsets {
    pub tstate_current: u64,
    pub tstate_frame: u64,
    pub frame_back: u64,
    pub frame_code: u64,
    pub code_name: u64,
}

static PY_OFFSETS: &[(&str, PyOffsets)] = &[
    (
        "3.11",
        PyOffsets {
            tstate_current: 568,
            tstate_frame: 56,
            frame_back: 24,
            frame_code: 32,
            code_name: 112,
        },
    ),
    (
        "3.12",
        PyOffsets {
            tstate_current: 584,
            tstate_frame: 72,
            frame_back: 8,
            frame_code: 0,
            code_name: 120,
        },
    ),
    (
        "3.13",
        PyOffsets {
            tstate_current: 592,
            tstate_frame: 72,
            frame_back: 8,
            frame_code: 0,
            code_name: 128,
        },
    ),
];

/// Look up offsets for a full CPython version (e.g. `3.12.4`).
///
/// Keyed by minor series; returns `None` for unsupported versions.
#[must_use]
pub fn offsets_for(version: &Version) -> Option<&'static PyOffsets> {
    let series = minor_series(version.as_str())?;
    PY_OFFSETS.iter().find(|(s, _)| *s == series).map(|(_, o)| o)
}

fn minor_series(version: &str) -> Option<String> {
    let mut parts = version.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    if major.is_empty() || minor.is_empty() {
        return None;
    }
    Some(format!("{major}.{minor}"))
}

// ============================================================================
// Version Resolver
// ============================================================================

/// The CPython runtime module.
pub struct PythonModule;

impl RuntimeModule for PythonModule {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Python
    }

    fn detect(
        &self,
        image: &dyn BinaryImage,
    ) -> Result<Option<Version>, DetectionError> {
        let Some(version_addr) = image.symbol(VERSION_SYMBOL) else {
            if image.symbol(RUNTIME_SYMBOL).is_some() {
                // Interpreter is embedded but predates the Py_Version export
                return Err(self.malformed(image, "_PyRuntime present but Py_Version missing"));
            }
            return Ok(None);
        };

        let bytes = image.read_at(version_addr, 4)?;
        let hex = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let Some(version) = decode_version_hex(hex) else {
            return Err(self.malformed(image, &format!("Py_Version value 0x{hex:08x} is invalid")));
        };

        if image.symbol(RUNTIME_SYMBOL).is_none() {
            return Err(self.malformed(image, "Py_Version present but _PyRuntime not exported"));
        }

        Ok(Some(version))
    }

    fn data_for(
        &self,
        image: &dyn BinaryImage,
        version: &Version,
    ) -> Option<Box<dyn RuntimeData>> {
        let offsets = offsets_for(version)?;
        // detect() already established the symbol exists
        let runtime_vaddr = image.symbol(RUNTIME_SYMBOL)?;
        Some(Box::new(PyData { version: version.clone(), offsets, runtime_vaddr }))
    }
}

impl PythonModule {
    fn malformed(&self, image: &dyn BinaryImage, reason: &str) -> DetectionError {
        DetectionError::MalformedVersion {
            kind: RuntimeKind::Python,
            file: image.file_name().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Decode `Py_Version` hex form into a dotted triplet.
///
/// Returns `None` when the value cannot be a release number (zero major).
fn decode_version_hex(hex: u32) -> Option<Version> {
    let major = hex >> 24;
    let minor = (hex >> 16) & 0xff;
    let micro = (hex >> 8) & 0xff;
    if major == 0 {
        return None;
    }
    Some(Version::new(format!("{major}.{minor}.{micro}")))
}

// ============================================================================
// Per-version data
// ============================================================================

struct PyData {
    version: Version,
    offsets: &'static PyOffsets,
    /// Link-time address of `_PyRuntime` (unbiased).
    runtime_vaddr: u64,
}

impl RuntimeData for PyData {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Python
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn proc_data(
        &self,
        pid: Pid,
        bias: u64,
        remote: &dyn RemoteMemory,
    ) -> Result<Vec<u8>, AttachError> {
        let runtime_addr = self.runtime_vaddr.wrapping_add(bias);

        // A wrong bias would hand the sampler a dangling address; probing the
        // first word catches that before anything reaches the kernel.
        remote.read_at(pid, runtime_addr, 8)?;

        let record = PyProcData {
            runtime_addr,
            tstate_current: self.offsets.tstate_current,
            tstate_frame: self.offsets.tstate_frame,
            frame_back: self.offsets.frame_back,
            frame_code: self.offsets.frame_code,
            code_name: self.offsets.code_name,
        };
        Ok(record.to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReadError;
    use crate::image::Section;
    use std::collections::HashMap;

    struct SymbolImage {
        symbols: HashMap<String, u64>,
        version_bytes: Vec<u8>,
        version_addr: u64,
    }

    impl SymbolImage {
        fn python(hex: u32) -> Self {
            let mut symbols = HashMap::new();
            symbols.insert(VERSION_SYMBOL.to_string(), 0x9000);
            symbols.insert(RUNTIME_SYMBOL.to_string(), 0xa000);
            Self {
                symbols,
                version_bytes: hex.to_le_bytes().to_vec(),
                version_addr: 0x9000,
            }
        }
    }

    impl BinaryImage for SymbolImage {
        fn file_name(&self) -> &str {
            "python-test"
        }
        fn sections(&self) -> &[Section] {
            &[]
        }
        fn symbol(&self, name: &str) -> Option<u64> {
            self.symbols.get(name).copied()
        }
        fn read_at(&self, vaddr: u64, len: usize) -> Result<Vec<u8>, ReadError> {
            if vaddr == self.version_addr && len <= self.version_bytes.len() {
                return Ok(self.version_bytes[..len].to_vec());
            }
            Err(ReadError::Unmapped { addr: vaddr })
        }
    }

    #[test]
    fn test_detects_py_version_hex() {
        let image = SymbolImage::python(0x030b_0900); // 3.11.9
        let version = PythonModule.detect(&image).unwrap().unwrap();
        assert_eq!(version.as_str(), "3.11.9");
    }

    #[test]
    fn test_no_symbols_is_not_this_runtime() {
        let image = SymbolImage {
            symbols: HashMap::new(),
            version_bytes: Vec::new(),
            version_addr: 0,
        };
        assert!(PythonModule.detect(&image).unwrap().is_none());
    }

    #[test]
    fn test_runtime_without_version_is_a_detection_error() {
        let mut image = SymbolImage::python(0);
        image.symbols.remove(VERSION_SYMBOL);
        let err = PythonModule.detect(&image).unwrap_err();
        assert!(err.to_string().contains("Py_Version missing"));
    }

    #[test]
    fn test_zero_major_is_a_detection_error() {
        let image = SymbolImage::python(0x0000_0100);
        assert!(PythonModule.detect(&image).is_err());
    }

    #[test]
    fn test_offsets_keyed_by_series() {
        let a = offsets_for(&Version::new("3.12.0")).unwrap();
        let b = offsets_for(&Version::new("3.12.7")).unwrap();
        assert_eq!(a, b);
        assert!(offsets_for(&Version::new("9.9.9")).is_none());
    }

    #[test]
    fn test_proc_data_applies_bias_and_probes_it() {
        struct ProbeRemote {
            expected: u64,
        }
        impl RemoteMemory for ProbeRemote {
            fn read_at(&self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>, ReadError> {
                assert_eq!(addr, self.expected);
                let _ = pid;
                Ok(vec![0; len])
            }
        }

        let image = SymbolImage::python(0x030c_0400); // 3.12.4
        let version = PythonModule.detect(&image).unwrap().unwrap();
        let data = PythonModule.data_for(&image, &version).unwrap();

        let bias = 0x5555_0000;
        let remote = ProbeRemote { expected: 0xa000 + bias };
        let blob = data.proc_data(Pid(7), bias, &remote).unwrap();

        // runtime_addr is the first packed field
        assert_eq!(&blob[..8], &(0xa000u64 + bias).to_le_bytes());
    }

    #[test]
    fn test_proc_data_fails_when_biased_address_unreadable() {
        struct DeadRemote;
        impl RemoteMemory for DeadRemote {
            fn read_at(&self, _pid: Pid, addr: u64, _len: usize) -> Result<Vec<u8>, ReadError> {
                Err(ReadError::Unmapped { addr })
            }
        }

        let image = SymbolImage::python(0x030b_0000);
        let version = PythonModule.detect(&image).unwrap().unwrap();
        let data = PythonModule.data_for(&image, &version).unwrap();
        assert!(data.proc_data(Pid(7), 0, &DeadRemote).is_err());
    }
}

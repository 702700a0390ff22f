//! Go runtime module
//!
//! Go binaries carry a `.go.buildinfo` section written by the linker: a
//! 32-byte header (magic, pointer size, flags) followed by the toolchain
//! version, either inline (go1.18+, uvarint length + bytes) or behind two
//! pointers into static data (older toolchains). Both layouts are read from
//! the on-disk image; no live process access is needed for detection.
//!
//! The offset tables describe how to walk from a thread's `g` to the current
//! goroutine's label map (per-task labels shown in profiles). They are keyed
//! by minor series - struct layouts only change between `go1.N` releases.

use crate::domain::{AttachError, DetectionError, Pid, Version};
use crate::image::BinaryImage;
use crate::interpreter::{RuntimeData, RuntimeKind, RuntimeModule};
use crate::remote::RemoteMemory;
use rtlens_common::GoProcData;

const BUILDINFO_SECTION: &str = ".go.buildinfo";
const BUILDINFO_MAGIC: &[u8; 14] = b"\xff Go buildinf:";
const BUILDINFO_HEADER_SIZE: usize = 32;

/// Header flag: fields are big-endian.
const FLAG_BIG_ENDIAN: u8 = 0x1;
/// Header flag: version string is inline after the header (go1.18+).
const FLAG_INLINE_STRING: u8 = 0x2;

/// Longest plausible inline version record (uvarint length + string).
const MAX_INLINE_READ: usize = 64;

// ============================================================================
// Offset Table Registry
// ============================================================================

/// Goroutine-label offsets per minor series.
///
/// `g.m` has been stable for years; `g.labels` drifts as fields are added to
/// the goroutine struct. Curated ahead of time for every series the detector
/// can report; a series missing here fails attachment cleanly as an
/// unsupported version.
static GO_OFFSETS: &[(&str, GoProcData)] = &[
    ("go1.18", go_offsets(344)),
    ("go1.19", go_offsets(352)),
    ("go1.20", go_offsets(352)),
    ("go1.21", go_offsets(360)),
    ("go1.22", go_offsets(360)),
    ("go1.23", go_offsets(368)),
    ("go1.24", go_offsets(368)),
];

const fn go_offsets(g_labels: u64) -> GoProcData {
    GoProcData {
        g_m: 48,
        m_curg: 192,
        g_labels,
        hmap_count: 0,
        hmap_log2_bucket_count: 9,
        hmap_buckets: 16,
    }
}

/// Look up the offset table for a full Go version (e.g. `go1.21.3`).
///
/// Tables are keyed by minor series, so `go1.21.3` and `go1.21.8` resolve to
/// the same entry. Returns `None` for unsupported (too old / too new)
/// versions.
#[must_use]
pub fn offsets_for(version: &Version) -> Option<&'static GoProcData> {
    let series = minor_series(version.as_str())?;
    GO_OFFSETS.iter().find(|(s, _)| *s == series).map(|(_, o)| o)
}

/// Reduce `go1.21.3` / `go1.22rc1` to its series key `go1.21` / `go1.22`.
fn minor_series(version: &str) -> Option<String> {
    let rest = version.strip_prefix("go1.")?;
    let minor: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if minor.is_empty() {
        return None;
    }
    Some(format!("go1.{minor}"))
}

// ============================================================================
// Version Resolver
// ============================================================================

/// The Go runtime module.
pub struct GoModule;

impl RuntimeModule for GoModule {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Go
    }

    fn detect(
        &self,
        image: &dyn BinaryImage,
    ) -> Result<Option<Version>, DetectionError> {
        let Some(section) = image.section(BUILDINFO_SECTION) else {
            return Ok(None);
        };
        let addr = section.addr;

        let header = image.read_at(addr, BUILDINFO_HEADER_SIZE)?;
        if header[..BUILDINFO_MAGIC.len()] != BUILDINFO_MAGIC[..] {
            return Err(self.malformed(image, "bad .go.buildinfo magic"));
        }

        let ptr_size = usize::from(header[14]);
        let flags = header[15];
        let big_endian = flags & FLAG_BIG_ENDIAN != 0;

        let raw = if flags & FLAG_INLINE_STRING != 0 {
            #[allow(clippy::cast_possible_truncation)]
            let avail = (section.size.saturating_sub(BUILDINFO_HEADER_SIZE as u64) as usize)
                .min(MAX_INLINE_READ);
            self.read_inline_version(image, addr, avail)?
        } else {
            self.read_pointer_version(image, addr, ptr_size, big_endian)?
        };

        if minor_series(&raw).is_none() {
            return Err(self.malformed(image, &format!("unrecognized version string {raw:?}")));
        }

        Ok(Some(Version::new(raw)))
    }

    fn data_for(
        &self,
        _image: &dyn BinaryImage,
        version: &Version,
    ) -> Option<Box<dyn RuntimeData>> {
        let offsets = offsets_for(version)?;
        Some(Box::new(GoData { version: version.clone(), offsets }))
    }
}

impl GoModule {
    fn malformed(&self, image: &dyn BinaryImage, reason: &str) -> DetectionError {
        DetectionError::MalformedVersion {
            kind: RuntimeKind::Go,
            file: image.file_name().to_string(),
            reason: reason.to_string(),
        }
    }

    /// go1.18+ layout: uvarint length + UTF-8 bytes directly after the header.
    fn read_inline_version(
        &self,
        image: &dyn BinaryImage,
        addr: u64,
        avail: usize,
    ) -> Result<String, DetectionError> {
        if avail == 0 {
            return Err(self.malformed(image, "no room for inline version after header"));
        }
        let chunk = image.read_at(addr + BUILDINFO_HEADER_SIZE as u64, avail)?;
        let Some((len, varint_len)) = read_uvarint(&chunk) else {
            return Err(self.malformed(image, "truncated inline version length"));
        };
        #[allow(clippy::cast_possible_truncation)]
        let len = len as usize;
        if len == 0 || varint_len + len > chunk.len() {
            return Err(self.malformed(image, "inline version length out of range"));
        }
        String::from_utf8(chunk[varint_len..varint_len + len].to_vec())
            .map_err(|_| self.malformed(image, "inline version is not UTF-8"))
    }

    /// Pre-go1.18 layout: header holds a pointer to a Go string header
    /// (data pointer + length), all in static data.
    fn read_pointer_version(
        &self,
        image: &dyn BinaryImage,
        addr: u64,
        ptr_size: usize,
        big_endian: bool,
    ) -> Result<String, DetectionError> {
        if ptr_size != 4 && ptr_size != 8 {
            return Err(self.malformed(image, &format!("unsupported pointer size {ptr_size}")));
        }

        let read_ptr = |vaddr: u64| -> Result<u64, DetectionError> {
            let bytes = image.read_at(vaddr, ptr_size)?;
            Ok(decode_ptr(&bytes, big_endian))
        };

        let str_header = read_ptr(addr + 16)?;
        let data_ptr = read_ptr(str_header)?;
        let str_len = read_ptr(str_header + ptr_size as u64)?;
        if str_len == 0 || str_len > MAX_INLINE_READ as u64 {
            return Err(self.malformed(image, "version string length out of range"));
        }

        #[allow(clippy::cast_possible_truncation)]
        let bytes = image.read_at(data_ptr, str_len as usize)?;
        String::from_utf8(bytes).map_err(|_| self.malformed(image, "version is not UTF-8"))
    }
}

fn decode_ptr(bytes: &[u8], big_endian: bool) -> u64 {
    let mut buf = [0u8; 8];
    if big_endian {
        buf[8 - bytes.len()..].copy_from_slice(bytes);
        u64::from_be_bytes(buf)
    } else {
        buf[..bytes.len()].copy_from_slice(bytes);
        u64::from_le_bytes(buf)
    }
}

/// Decode an unsigned LEB128 varint; returns (value, encoded length).
fn read_uvarint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().enumerate().take(10) {
        value |= u64::from(b & 0x7f) << (i * 7);
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

// ============================================================================
// Per-version data
// ============================================================================

struct GoData {
    version: Version,
    offsets: &'static GoProcData,
}

impl RuntimeData for GoData {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Go
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn proc_data(
        &self,
        _pid: Pid,
        _bias: u64,
        _remote: &dyn RemoteMemory,
    ) -> Result<Vec<u8>, AttachError> {
        // Pure heap-structure offsets; nothing here is position-dependent,
        // so the load bias does not apply.
        Ok(self.offsets.to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReadError;
    use crate::image::Section;

    const BASE: u64 = 0x4000;

    struct BuildinfoImage {
        sections: Vec<Section>,
        payload: Vec<u8>,
    }

    impl BuildinfoImage {
        fn new(payload: Vec<u8>) -> Self {
            let sections = vec![Section {
                name: BUILDINFO_SECTION.to_string(),
                addr: BASE,
                size: payload.len() as u64,
                file_range: None,
            }];
            Self { sections, payload }
        }

        fn inline(version: &str) -> Self {
            let mut payload = Vec::new();
            payload.extend_from_slice(BUILDINFO_MAGIC);
            payload.push(8); // pointer size
            payload.push(FLAG_INLINE_STRING);
            payload.resize(BUILDINFO_HEADER_SIZE, 0);
            #[allow(clippy::cast_possible_truncation)]
            payload.push(version.len() as u8); // single-byte uvarint
            payload.extend_from_slice(version.as_bytes());
            payload.resize(BUILDINFO_HEADER_SIZE + MAX_INLINE_READ, 0);
            Self::new(payload)
        }

        fn bad_magic() -> Self {
            let mut image = Self::inline("go1.21.3");
            image.payload[0] = 0x00;
            image
        }
    }

    impl BinaryImage for BuildinfoImage {
        fn file_name(&self) -> &str {
            "buildinfo-test"
        }
        fn sections(&self) -> &[Section] {
            &self.sections
        }
        fn symbol(&self, _name: &str) -> Option<u64> {
            None
        }
        fn read_at(&self, vaddr: u64, len: usize) -> Result<Vec<u8>, ReadError> {
            let end = vaddr + len as u64;
            if vaddr < BASE || end > BASE + self.payload.len() as u64 {
                return Err(ReadError::Unmapped { addr: vaddr });
            }
            #[allow(clippy::cast_possible_truncation)]
            let off = (vaddr - BASE) as usize;
            Ok(self.payload[off..off + len].to_vec())
        }
    }

    #[test]
    fn test_detects_inline_version() {
        let image = BuildinfoImage::inline("go1.21.3");
        let version = GoModule.detect(&image).unwrap().unwrap();
        assert_eq!(version.as_str(), "go1.21.3");
    }

    #[test]
    fn test_detect_is_idempotent() {
        let image = BuildinfoImage::inline("go1.22.0");
        let first = GoModule.detect(&image).unwrap();
        let second = GoModule.detect(&image).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_section_is_not_this_runtime() {
        struct NoSections;
        impl BinaryImage for NoSections {
            fn file_name(&self) -> &str {
                "plain"
            }
            fn sections(&self) -> &[Section] {
                &[]
            }
            fn symbol(&self, _name: &str) -> Option<u64> {
                None
            }
            fn read_at(&self, vaddr: u64, _len: usize) -> Result<Vec<u8>, ReadError> {
                Err(ReadError::Unmapped { addr: vaddr })
            }
        }
        assert!(GoModule.detect(&NoSections).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_a_detection_error() {
        let image = BuildinfoImage::bad_magic();
        let err = GoModule.detect(&image).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_garbage_version_string_is_a_detection_error() {
        let image = BuildinfoImage::inline("devel +abc123");
        assert!(GoModule.detect(&image).is_err());
    }

    #[test]
    fn test_offsets_keyed_by_minor_series() {
        let a = offsets_for(&Version::new("go1.21.3")).unwrap();
        let b = offsets_for(&Version::new("go1.21.8")).unwrap();
        assert_eq!(a, b);

        let c = offsets_for(&Version::new("go1.23.1")).unwrap();
        assert_ne!(a.g_labels, c.g_labels);
    }

    #[test]
    fn test_unsupported_series_has_no_offsets() {
        assert!(offsets_for(&Version::new("go1.99.0")).is_none());
        assert!(offsets_for(&Version::new("not-go")).is_none());
    }

    #[test]
    fn test_uvarint_decoding() {
        assert_eq!(read_uvarint(&[0x08]), Some((8, 1)));
        assert_eq!(read_uvarint(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(read_uvarint(&[0x80]), None); // truncated
    }
}

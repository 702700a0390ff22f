//! Read-only view of one executable's on-disk layout
//!
//! Runtime detection needs three things from a binary: which sections exist,
//! which symbols are exported, and the static bytes at a given virtual
//! address. [`BinaryImage`] is that minimal contract; [`ElfImage`] is the
//! concrete accessor built on the `object` crate.
//!
//! Images are short-lived: they are opened for detection/attach and discarded
//! afterwards, never retained by a live process instance.

use crate::domain::ReadError;
use anyhow::{Context, Result};
use object::{Object, ObjectSection, ObjectSymbol};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One loadable section of the binary.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    /// Link-time virtual address.
    pub addr: u64,
    pub size: u64,
    /// Byte range within the file, if the section has file-backed data.
    pub file_range: Option<(u64, u64)>,
}

/// Minimal binary-format queries needed for runtime detection.
///
/// Implementations must be idempotent and side-effect-free: detection may
/// call into the same image repeatedly and expects identical answers.
pub trait BinaryImage {
    /// File name, for diagnostics only.
    fn file_name(&self) -> &str;

    /// Sections in file order.
    fn sections(&self) -> &[Section];

    /// Address of an exported (static or dynamic) symbol.
    fn symbol(&self, name: &str) -> Option<u64>;

    /// Read static data at a link-time virtual address.
    fn read_at(&self, vaddr: u64, len: usize) -> Result<Vec<u8>, ReadError>;

    /// First section with the given name, if any.
    fn section(&self, name: &str) -> Option<&Section> {
        self.sections().iter().find(|s| s.name == name)
    }
}

/// ELF accessor: sections and symbol tables are extracted once at open, so
/// later queries never re-parse the file.
pub struct ElfImage {
    file_name: String,
    data: Vec<u8>,
    sections: Vec<Section>,
    symbols: HashMap<String, u64>,
    position_independent: bool,
}

impl ElfImage {
    /// Open and parse an executable.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid ELF.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path.display().to_string();
        let data =
            fs::read(path).with_context(|| format!("Failed to read binary {file_name}"))?;

        let obj = object::File::parse(&*data)
            .with_context(|| format!("Failed to parse {file_name} as ELF"))?;

        let mut sections = Vec::new();
        for section in obj.sections() {
            let Ok(name) = section.name() else { continue };
            sections.push(Section {
                name: name.to_string(),
                addr: section.address(),
                size: section.size(),
                file_range: section.file_range(),
            });
        }

        // Both tables: stripped binaries often keep only .dynsym
        let mut symbols = HashMap::new();
        for symbol in obj.symbols().chain(obj.dynamic_symbols()) {
            if let Ok(name) = symbol.name() {
                if !name.is_empty() && symbol.address() > 0 {
                    symbols.insert(name.to_string(), symbol.address());
                }
            }
        }

        let position_independent = matches!(obj.kind(), object::ObjectKind::Dynamic);

        Ok(Self { file_name, data, sections, symbols, position_independent })
    }

    /// Whether the executable is position-independent (ET_DYN).
    ///
    /// PIE binaries need a per-process load bias added to link-time
    /// addresses; fixed-position binaries use them as-is.
    #[must_use]
    pub fn is_position_independent(&self) -> bool {
        self.position_independent
    }
}

impl BinaryImage for ElfImage {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    fn read_at(&self, vaddr: u64, len: usize) -> Result<Vec<u8>, ReadError> {
        let end = vaddr
            .checked_add(len as u64)
            .ok_or(ReadError::Unmapped { addr: vaddr })?;

        let section = self
            .sections
            .iter()
            .find(|s| vaddr >= s.addr && end <= s.addr + s.size)
            .ok_or(ReadError::Unmapped { addr: vaddr })?;

        let Some((file_off, file_len)) = section.file_range else {
            // NOBITS sections (.bss) have no file data to read
            return Err(ReadError::Unmapped { addr: vaddr });
        };

        let delta = vaddr - section.addr;
        if delta + len as u64 > file_len {
            #[allow(clippy::cast_possible_truncation)]
            return Err(ReadError::Short {
                addr: vaddr,
                wanted: len,
                got: file_len.saturating_sub(delta) as usize,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let start = (file_off + delta) as usize;
        Ok(self.data[start..start + len].to_vec())
    }
}

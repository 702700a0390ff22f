//! # Sampler Handle (kernel boundary)
//!
//! The in-kernel sampler walks managed stacks using per-process offset
//! records it finds in per-runtime BPF maps (`GO_PROC_DATA`, `PY_PROC_DATA`,
//! keyed by PID). [`EbpfSampler`] adapts those maps to the
//! [`SamplerHandle`] contract the interpreter framework registers through.
//!
//! The sampler bytecode itself is external: it is loaded from an object file
//! supplied at startup (`--sampler-obj`), never embedded here. This module
//! only moves data across the boundary; it performs no unwinding and applies
//! no bias adjustments (records arrive fully adjusted).

use crate::domain::{Pid, SamplerError};
use crate::interpreter::{RuntimeKind, SamplerHandle};
use anyhow::{Context, Result};
use aya::maps::{HashMap as BpfHashMap, MapData, MapError};
use aya::Ebpf;
use log::info;
use rtlens_common::ProcData;
use std::collections::HashMap;

/// Sampler handle backed by the loaded eBPF program's per-runtime maps.
///
/// Each (kind, PID) key maps to an independent entry; the kernel provides
/// safe concurrent access across distinct keys, so no extra locking is
/// layered on top.
pub struct EbpfSampler {
    maps: HashMap<RuntimeKind, BpfHashMap<MapData, u32, ProcData>>,
}

impl EbpfSampler {
    /// Take ownership of the per-runtime proc-data maps from a loaded
    /// sampler program.
    ///
    /// # Errors
    /// Returns an error if any expected map is missing from the object or
    /// has an incompatible type - both indicate a sampler build that does
    /// not match this agent.
    pub fn new(bpf: &mut Ebpf) -> Result<Self> {
        let mut maps = HashMap::new();
        for &kind in RuntimeKind::all() {
            let map = bpf
                .take_map(kind.map_name())
                .with_context(|| format!("{} map not found in sampler object", kind.map_name()))?;
            let map = BpfHashMap::try_from(map)
                .with_context(|| format!("{} map has unexpected layout", kind.map_name()))?;
            maps.insert(kind, map);
        }
        info!("✓ Bound {} per-runtime sampler maps", maps.len());
        Ok(Self { maps })
    }

    fn map_mut(
        &mut self,
        kind: RuntimeKind,
    ) -> Result<&mut BpfHashMap<MapData, u32, ProcData>, SamplerError> {
        self.maps
            .get_mut(&kind)
            .ok_or_else(|| SamplerError::MapUpdate(format!("no map bound for {kind}")))
    }
}

impl SamplerHandle for EbpfSampler {
    fn register(&mut self, kind: RuntimeKind, pid: Pid, blob: &[u8]) -> Result<(), SamplerError> {
        let record = ProcData::from_slice(blob).ok_or(SamplerError::BlobTooLarge {
            kind,
            len: blob.len(),
            max: rtlens_common::PROC_DATA_MAX,
        })?;

        let map = self.map_mut(kind)?;
        if map.get(&pid.0, 0).is_ok() {
            return Err(SamplerError::AlreadyRegistered { kind, pid });
        }
        map.insert(pid.0, record, 0)
            .map_err(|e| SamplerError::MapUpdate(e.to_string()))
    }

    fn unregister(&mut self, kind: RuntimeKind, pid: Pid) -> Result<(), SamplerError> {
        let map = self.map_mut(kind)?;
        match map.remove(&pid.0) {
            Ok(()) => Ok(()),
            Err(e) if entry_absent(&e) => Err(SamplerError::NotRegistered { kind, pid }),
            Err(e) => Err(SamplerError::MapUpdate(e.to_string())),
        }
    }
}

/// The kernel reports a missing entry either as a typed lookup miss or as
/// ENOENT from the delete syscall, depending on the code path.
fn entry_absent(err: &MapError) -> bool {
    match err {
        MapError::KeyNotFound => true,
        MapError::SyscallError(e) => e.io_error.raw_os_error() == Some(libc::ENOENT),
        _ => false,
    }
}

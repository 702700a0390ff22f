//! # Runtime-Introspection Plugin Framework
//!
//! Managed runtimes (goroutine schedulers, CPython's interpreter loop) keep
//! their call-stack state in runtime-internal structures, so the in-kernel
//! sampler cannot unwind them from program counters alone. This module is the
//! contract that closes the gap:
//!
//! 1. A [`RuntimeModule`] inspects a [`BinaryImage`] and decides whether the
//!    binary embeds its runtime, and at which exact version (detection).
//! 2. The module resolves that version against its static offset tables,
//!    yielding [`RuntimeData`] - everything needed to build a per-process
//!    attachment record.
//! 3. [`Classification::attach`] applies the process load bias, builds the
//!    offset blob and registers it with the [`SamplerHandle`], keyed by
//!    (runtime kind, PID). The resulting [`ProcessInstance`] owns that
//!    registration until [`ProcessInstance::detach`] removes it.
//!
//! ## Lifecycle
//!
//! ```text
//!   InterpreterRegistry::resolve(image)
//!           │
//!           ▼
//!     Classification ── attach(sampler, pid, bias, remote) ──▶ ProcessInstance
//!                                                                   │
//!                                              detach(sampler) ◀────┘
//!                                              (terminal; a fresh attach
//!                                               needs a fresh resolve)
//! ```
//!
//! ## Concurrency
//!
//! The registry and all offset tables are read-only after startup and safe
//! for unsynchronized concurrent reads. Attach/detach for *different*
//! (PID, kind) pairs may run concurrently; for a single pair the caller must
//! let attach complete before issuing detach - this module documents, but
//! does not lock, that ordering.

use crate::domain::{
    AttachError, DetachError, DetectionError, LoaderError, Pid, SamplerError, Version,
};
use crate::image::BinaryImage;
use crate::remote::RemoteMemory;
use log::{debug, warn};
use std::fmt;

pub mod golang;
pub mod python;

pub use golang::GoModule;
pub use python::PythonModule;

/// Supported managed runtime families. Closed set, known at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    Go,
    Python,
}

impl RuntimeKind {
    /// Numeric tag shared with the kernel side (see `rtlens-common`).
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            RuntimeKind::Go => rtlens_common::RUNTIME_KIND_GO,
            RuntimeKind::Python => rtlens_common::RUNTIME_KIND_PYTHON,
        }
    }

    /// Name of the sampler-side map holding this runtime's per-process data.
    #[must_use]
    pub fn map_name(self) -> &'static str {
        match self {
            RuntimeKind::Go => "GO_PROC_DATA",
            RuntimeKind::Python => "PY_PROC_DATA",
        }
    }

    /// All supported kinds, in registration order.
    #[must_use]
    pub fn all() -> &'static [RuntimeKind] {
        &[RuntimeKind::Go, RuntimeKind::Python]
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Go => write!(f, "go"),
            RuntimeKind::Python => write!(f, "python"),
        }
    }
}

/// The kernel-tracer interface the framework registers per-process data with.
///
/// Each (kind, PID) key is an independent logical resource; implementations
/// must provide safe concurrent access across distinct keys. Calls may block
/// briefly (kernel map updates) and are non-reentrant per key.
pub trait SamplerHandle {
    /// Install `blob` for (kind, pid).
    ///
    /// # Errors
    /// `AlreadyRegistered` if the key is live - a duplicate attach is a
    /// caller error and must never silently stack a second registration.
    fn register(&mut self, kind: RuntimeKind, pid: Pid, blob: &[u8]) -> Result<(), SamplerError>;

    /// Remove the entry for (kind, pid).
    ///
    /// # Errors
    /// `NotRegistered` if no entry exists; callers tolerate that during
    /// detach since the kernel side may drop entries on process exit itself.
    fn unregister(&mut self, kind: RuntimeKind, pid: Pid) -> Result<(), SamplerError>;
}

/// One pluggable runtime: detection plus version-to-offsets resolution.
///
/// Modules are stateless, registered once at startup, and shared read-only
/// across every process of their kind.
pub trait RuntimeModule: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// Decide whether `image` embeds this runtime, and at which version.
    ///
    /// `Ok(None)` means "not this runtime" and is a silent skip, not an
    /// error. Must be idempotent and side-effect-free.
    ///
    /// # Errors
    /// [`DetectionError`] when runtime evidence exists but the version or
    /// signature is malformed.
    fn detect(&self, image: &dyn BinaryImage) -> Result<Option<Version>, DetectionError>;

    /// Offset-table lookup for a detected version.
    ///
    /// `image` is the same binary `detect` matched; modules whose attachment
    /// data includes image-derived values (static symbol addresses) capture
    /// them here. `None` means the version is not supported (no curated
    /// table); the registry turns that into
    /// [`LoaderError::UnsupportedVersion`].
    fn data_for(
        &self,
        image: &dyn BinaryImage,
        version: &Version,
    ) -> Option<Box<dyn RuntimeData>>;
}

/// Version-resolved template from which per-process attachments are stamped.
pub trait RuntimeData: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    fn version(&self) -> &Version;

    /// Build the per-process offset blob handed to the sampler.
    ///
    /// `bias` is the executable's load offset; it is applied additively here
    /// to any position-dependent field, never by the sampler. `remote` lets
    /// a module validate derived addresses against the live process.
    ///
    /// # Errors
    /// Read failures against the live process.
    fn proc_data(
        &self,
        pid: Pid,
        bias: u64,
        remote: &dyn RemoteMemory,
    ) -> Result<Vec<u8>, AttachError>;
}

/// Result of classifying one binary: a matched runtime, its version, and the
/// version-resolved data ready to stamp process instances.
pub struct Classification {
    kind: RuntimeKind,
    version: Version,
    data: Box<dyn RuntimeData>,
}

impl Classification {
    #[must_use]
    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Build the bias-adjusted offset blob for one process.
    ///
    /// Exposed separately from [`attach`](Self::attach) so callers and tests
    /// can inspect exactly what would be registered.
    ///
    /// # Errors
    /// Read failures against the live process.
    pub fn proc_data(
        &self,
        pid: Pid,
        bias: u64,
        remote: &dyn RemoteMemory,
    ) -> Result<Vec<u8>, AttachError> {
        self.data.proc_data(pid, bias, remote)
    }

    /// Attach one process: exactly one sampler registration for (kind, pid).
    ///
    /// On failure nothing is left behind - the single `register` call either
    /// fully succeeds or the sampler state is untouched. No retry is
    /// attempted here; the caller decides whether to retry or abandon.
    ///
    /// # Errors
    /// Blob construction or sampler registration failures.
    pub fn attach(
        &self,
        sampler: &mut dyn SamplerHandle,
        pid: Pid,
        bias: u64,
        remote: &dyn RemoteMemory,
    ) -> Result<ProcessInstance, AttachError> {
        let blob = self.data.proc_data(pid, bias, remote)?;
        sampler.register(self.kind, pid, &blob)?;
        debug!("attached {}/{} ({} byte record)", self.kind, pid, blob.len());
        Ok(ProcessInstance { kind: self.kind, pid, state: InstanceState::Attached })
    }
}

impl fmt::Debug for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classification")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Tries each registered runtime module against a binary, in registration
/// order, returning at most one match.
pub struct InterpreterRegistry {
    modules: Vec<Box<dyn RuntimeModule>>,
}

impl InterpreterRegistry {
    /// Empty registry; modules are added with [`register`](Self::register).
    #[must_use]
    pub fn new() -> Self {
        Self { modules: Vec::new() }
    }

    /// Registry with every built-in runtime module, in fixed order.
    #[must_use]
    pub fn with_default_modules() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GoModule));
        registry.register(Box::new(PythonModule));
        registry
    }

    /// Append a module. Order is significant: the first module whose
    /// detector matches wins.
    pub fn register(&mut self, module: Box<dyn RuntimeModule>) {
        self.modules.push(module);
    }

    /// Classify one binary.
    ///
    /// Purely a classification step: no kernel-side or process-specific side
    /// effects. Dispatch stops at the first detector that reports a match;
    /// a detector error skips only that module (logged at warn) while the
    /// remaining modules are still tried.
    ///
    /// # Errors
    /// [`LoaderError::UnsupportedVersion`] when a runtime matched but its
    /// version has no curated offset table - deliberately loud, so "we don't
    /// recognize this binary" and "we recognize it but don't support the
    /// version yet" stay distinguishable.
    pub fn resolve(
        &self,
        image: &dyn BinaryImage,
    ) -> Result<Option<Classification>, LoaderError> {
        for module in &self.modules {
            let kind = module.kind();
            let version = match module.detect(image) {
                Ok(Some(version)) => version,
                Ok(None) => {
                    debug!("{} is not a {kind} binary", image.file_name());
                    continue;
                }
                Err(e) => {
                    warn!("{kind} detection failed for {}: {e}", image.file_name());
                    continue;
                }
            };

            debug!("{} detected as {kind} version {version}", image.file_name());

            let Some(data) = module.data_for(image, &version) else {
                return Err(LoaderError::UnsupportedVersion { kind, version });
            };

            return Ok(Some(Classification { kind, version, data }));
        }

        Ok(None)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for InterpreterRegistry {
    fn default() -> Self {
        Self::with_default_modules()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstanceState {
    Attached,
    Detached,
}

/// Live attachment state for one (PID, runtime kind) pair.
///
/// Created in the attached state by [`Classification::attach`]; exclusively
/// owns its sampler registration. `Attached -> Detached` is the only
/// transition and it is terminal: profiling the same process again requires
/// a fresh resolve + attach.
#[derive(Debug)]
pub struct ProcessInstance {
    kind: RuntimeKind,
    pid: Pid,
    state: InstanceState,
}

impl ProcessInstance {
    #[must_use]
    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state == InstanceState::Attached
    }

    /// Remove this instance's sampler registration. Terminal.
    ///
    /// The instance transitions to detached even when the sampler call
    /// fails, so tracking state is never leaked while kernel cleanup is
    /// uncertain. An already-absent entry is tolerated (the kernel side may
    /// have noticed the process exit first); any other sampler failure is
    /// logged and returned.
    ///
    /// # Errors
    /// `AlreadyDetached` on a second detach; sampler failures other than
    /// absence.
    pub fn detach(&mut self, sampler: &mut dyn SamplerHandle) -> Result<(), DetachError> {
        if self.state == InstanceState::Detached {
            return Err(DetachError::AlreadyDetached { kind: self.kind, pid: self.pid });
        }
        self.state = InstanceState::Detached;

        match sampler.unregister(self.kind, self.pid) {
            Ok(()) => Ok(()),
            Err(SamplerError::NotRegistered { .. }) => {
                debug!("{}/{} was already gone from the sampler", self.kind, self.pid);
                Ok(())
            }
            Err(e) => {
                warn!("failed to unregister {}/{}: {e}", self.kind, self.pid);
                Err(e.into())
            }
        }
    }
}

//! # rtlens - Runtime Introspection for a Continuous Profiler
//!
//! rtlens is the userspace half of a continuous profiler for processes that
//! embed a managed runtime (Go's goroutine scheduler, CPython's interpreter
//! loop). The in-kernel sampler can capture program counters on its own, but
//! walking a *managed* stack - green threads, runtime-managed stack
//! switching, per-task labels - requires knowing exactly where that runtime
//! version keeps its internal structures. rtlens supplies that knowledge.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Target Process                            │
//! │            (Go binary / CPython interpreter)                 │
//! └──────────────┬───────────────────────────────────────────────┘
//!                │ binary image (detection)     │ live memory
//!                ▼                              ▼ (validation)
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    rtlens (This Crate)                       │
//! │                                                              │
//! │  ┌────────────┐    ┌─────────────────┐    ┌──────────────┐  │
//! │  │  ElfImage  │──▶│  Interpreter    │──▶│ EbpfSampler  │  │
//! │  │ (sections, │    │  Registry       │    │ (per-runtime │  │
//! │  │  symbols)  │    │ (detect+attach) │    │  BPF maps)   │  │
//! │  └────────────┘    └─────────────────┘    └──────┬───────┘  │
//! └──────────────────────────────────────────────────┼──────────┘
//!                                                    ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │            Kernel Sampler (external eBPF program)            │
//! │   walks managed stacks using the registered offset records   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`interpreter`]: the plugin framework - runtime detection, offset-table
//!   resolution, and the per-process attach/detach lifecycle
//!   - `golang`: `.go.buildinfo` detection + goroutine-label offsets
//!   - `python`: `Py_Version` detection + frame-walking offsets
//! - [`image`]: read-only ELF accessor (sections, symbols, static reads)
//! - [`remote`]: live process memory reads (`process_vm_readv`)
//! - [`sampler`]: the kernel boundary - per-runtime BPF proc-data maps
//! - [`memory_maps`]: PIE load-bias discovery from `/proc/<pid>/maps`
//! - [`process_lookup`]: PID/binary auto-detection by process name
//! - [`hostinfo`]: online-CPU facts reported alongside profiles
//! - [`preflight`]: privilege and kernel-version checks
//! - [`domain`]: core types (`Pid`, `Version`) and the error taxonomy
//!
//! ## Lifecycle Guarantees
//!
//! - Classification is pure: resolving a binary performs no kernel-side or
//!   process-specific side effects.
//! - Exactly one sampler registration exists per live (PID, runtime kind)
//!   pair; duplicate attaches are rejected, never silently stacked.
//! - Detach is terminal and removes the registration exactly once; an entry
//!   the kernel already reaped is tolerated, a double detach is an error.
//! - A single undetectable or unattachable process never takes the agent
//!   down - every failure is a typed value scoped to that process.

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod hostinfo;
pub mod image;
pub mod interpreter;
pub mod memory_maps;
pub mod preflight;
pub mod process_lookup;
pub mod remote;
pub mod sampler;

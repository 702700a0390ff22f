//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// Default install location of the kernel-side sampler object.
pub const DEFAULT_SAMPLER_OBJ: &str = "/usr/lib/rtlens/sampler.o";

#[derive(Parser)]
#[command(
    name = "rtlens",
    about = "Attach runtime introspection for managed-runtime processes to the kernel sampler",
    after_help = "\
EXAMPLES:
    sudo rtlens my-service                   Auto-detect PID and binary
    sudo rtlens --pid 1234                   Explicit PID, auto-detect binary
    sudo rtlens --pid 1234 --detect-only     Classify the binary, attach nothing"
)]
pub struct Args {
    /// Process name to attach to (auto-detects PID and binary)
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to attach to (binary path auto-detected from /proc)
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// Path to the target binary (optional, auto-detected if omitted)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Path to the compiled sampler eBPF object
    #[arg(long, value_name = "FILE", default_value = DEFAULT_SAMPLER_OBJ)]
    pub sampler_obj: PathBuf,

    /// Detach after N seconds (0 = until the process exits)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Classify the binary and print the result without attaching
    #[arg(long)]
    pub detect_only: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

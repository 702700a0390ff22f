//! # rtlens - Main Entry Point
//!
//! Drives one attach/detach cycle for a single target process:
//! classify the binary, register its offset record with the sampler, wait
//! for process exit (or the deadline), then unregister.

use anyhow::{Context, Result};
use aya::Ebpf;
use clap::Parser;
use log::{info, warn};
use std::path::Path;
use std::time::{Duration, Instant};

use rtlens::cli::Args;
use rtlens::domain::Pid;
use rtlens::hostinfo::{format_cpu_list, online_cpus};
use rtlens::image::ElfImage;
use rtlens::interpreter::InterpreterRegistry;
use rtlens::memory_maps::load_bias;
use rtlens::preflight::run_preflight_checks;
use rtlens::process_lookup::{find_process_by_name, resolve_exe_path};
use rtlens::remote::ProcessVmReader;
use rtlens::sampler::EbpfSampler;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Resolve PID and binary path from CLI arguments.
///
/// Supports three modes:
/// - `rtlens my-service` - find process by name, auto-detect binary
/// - `rtlens --pid 1234` - explicit PID, auto-detect binary from /proc
/// - `rtlens --pid 1234 --target ./app` - explicit PID and binary
fn resolve_pid_and_target(args: &Args) -> Result<(i32, String)> {
    if let Some(ref name) = args.process {
        if args.pid.is_some() || args.target.is_some() {
            anyhow::bail!(
                "Cannot use PROCESS argument with --pid or --target.\n\n\
                 Use either:\n  \
                 rtlens my-service       (auto-detect)\n  \
                 rtlens --pid 1234       (explicit PID)"
            );
        }
        let info = find_process_by_name(name)?;
        let target = info.exe_path.to_string_lossy().into_owned();
        return Ok((info.pid, target));
    }

    if let Some(pid) = args.pid {
        let target = if let Some(ref t) = args.target {
            std::fs::canonicalize(t)
                .with_context(|| format!("Failed to resolve path: {t}"))?
                .to_string_lossy()
                .into_owned()
        } else {
            resolve_exe_path(pid)?.to_string_lossy().into_owned()
        };
        return Ok((pid, target));
    }

    anyhow::bail!(
        "Missing required argument: PROCESS or --pid\n\n\
         Usage:\n  \
         rtlens my-service       Auto-detect PID and binary\n  \
         rtlens --pid 1234       Explicit PID, auto-detect binary\n\n\
         Run 'rtlens --help' for more options"
    )
}

fn run() -> Result<()> {
    let args = Args::parse();

    let (pid, target) = resolve_pid_and_target(&args)?;

    if !args.detect_only {
        run_preflight_checks(&target)?;
    }

    if !args.quiet {
        if let Ok(cpus) = online_cpus() {
            info!("Online CPUs: {}", format_cpu_list(&cpus));
        }
    }

    // Classification is pure: no kernel or process side effects yet
    let image = ElfImage::open(&target)?;
    let registry = InterpreterRegistry::with_default_modules();
    let classification = match registry.resolve(&image)? {
        Some(c) => c,
        None => {
            anyhow::bail!("{target} does not embed a supported managed runtime");
        }
    };

    println!(
        "✓ {} detected as {} version {}",
        target,
        classification.kind(),
        classification.version()
    );

    if args.detect_only {
        return Ok(());
    }

    let pid = Pid::from(pid);
    let bias = load_bias(pid, &target, &image)?;
    info!("Load bias for {pid}: 0x{bias:x}");

    // The sampler bytecode is deployed separately; we only bind its maps
    let mut bpf = Ebpf::load_file(&args.sampler_obj).with_context(|| {
        format!("Failed to load sampler object {}", args.sampler_obj.display())
    })?;
    let mut sampler = EbpfSampler::new(&mut bpf)?;

    let remote = ProcessVmReader;
    let mut instance = classification.attach(&mut sampler, pid, bias, &remote)?;
    println!("✓ Attached {}/{}", instance.kind(), instance.pid());

    wait_for_exit(pid, args.duration);

    match instance.detach(&mut sampler) {
        Ok(()) => println!("✓ Detached {}/{}", instance.kind(), pid),
        Err(e) => warn!("Detach reported an error (kernel cleanup uncertain): {e}"),
    }

    Ok(())
}

/// Block until the target exits or the deadline passes (0 = no deadline).
fn wait_for_exit(pid: Pid, duration_secs: u64) {
    let deadline =
        (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    let proc_dir = format!("/proc/{}", pid.0);

    loop {
        if !Path::new(&proc_dir).exists() {
            info!("{pid} exited");
            return;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!("Deadline reached, detaching from {pid}");
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(500));
    }
}

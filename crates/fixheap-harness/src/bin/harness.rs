//! CLI entrypoint for the fixheap trace harness.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use fixheap_harness::structured_log::{
    LogEmitter, LogEntry, LogLevel, sha256_hex, validate_log_file,
};
use fixheap_harness::trace::{TraceConfig, run_trace};

/// Trace tooling for the fixheap allocator.
#[derive(Debug, Parser)]
#[command(name = "fixheap-harness")]
#[command(about = "Deterministic trace harness for the fixheap allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a deterministic trace and emit a JSONL log plus report.
    Run {
        /// Seed for the operation stream; equal seeds replay equal runs.
        #[arg(long, default_value_t = 0xB10C_FEED)]
        seed: u64,
        /// Number of operations to execute.
        #[arg(long, default_value_t = 2000)]
        ops: usize,
        /// Arena length in bytes.
        #[arg(long, default_value_t = 65536)]
        arena_len: usize,
        /// Upper bound on a single request, in bytes.
        #[arg(long, default_value_t = 512)]
        max_request: usize,
        /// JSONL structured log path (stdout if omitted).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Report output path (stdout if omitted).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Render the report as markdown instead of JSON.
        #[arg(long)]
        markdown: bool,
        /// Fixed timestamp string for deterministic log generation.
        #[arg(long, default_value = "1970-01-01T00:00:00Z")]
        timestamp: String,
    },
    /// Validate a JSONL structured log file.
    ValidateLog {
        /// Structured JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
    /// Print the SHA-256 checksum of an artifact file.
    Checksum {
        /// Artifact path.
        #[arg(long)]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    match Cli::parse().command {
        Command::Run {
            seed,
            ops,
            arena_len,
            max_request,
            log,
            report,
            markdown,
            timestamp,
        } => run(
            TraceConfig {
                seed,
                ops,
                arena_len,
                max_request,
            },
            log,
            report,
            markdown,
            &timestamp,
        ),
        Command::ValidateLog { log } => match validate_log_file(&log) {
            Ok(count) => {
                println!("{}: {count} valid entries", log.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{}: {err}", log.display());
                ExitCode::FAILURE
            }
        },
        Command::Checksum { path } => match sha256_hex(&path) {
            Ok(digest) => {
                println!("{digest}  {}", path.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                ExitCode::FAILURE
            }
        },
    }
}

fn run(
    config: TraceConfig,
    log: Option<PathBuf>,
    report_path: Option<PathBuf>,
    markdown: bool,
    timestamp: &str,
) -> ExitCode {
    let report = run_trace(&config);
    let trace_id = format!("harness::run::{:016x}", config.seed);

    let mut emitter = match &log {
        Some(path) => match LogEmitter::file(path) {
            Ok(emitter) => emitter,
            Err(err) => {
                eprintln!("cannot open log {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => LogEmitter::stdout(),
    };

    for violation in &report.violations {
        let mut entry = LogEntry::new(timestamp, &trace_id, LogLevel::Error, "invariant_violation");
        entry.details = Some(violation.clone());
        if let Err(err) = emitter.emit(&entry) {
            eprintln!("log write failed: {err}");
            return ExitCode::FAILURE;
        }
    }
    let mut summary = LogEntry::new(
        timestamp,
        &trace_id,
        if report.is_clean() {
            LogLevel::Info
        } else {
            LogLevel::Error
        },
        "trace_complete",
    );
    summary.size = Some(config.arena_len);
    summary.outcome = Some(if report.is_clean() { "pass" } else { "fail" }.to_string());
    summary.details = Some(format!(
        "{} ops, {} allocations, {} oom events, {} violations",
        report.ops_executed,
        report.allocs_succeeded,
        report.oom_events,
        report.violations.len()
    ));
    if let Err(err) = emitter.emit(&summary).and_then(|()| emitter.flush()) {
        eprintln!("log write failed: {err}");
        return ExitCode::FAILURE;
    }

    let rendered = if markdown {
        report.to_markdown()
    } else {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("cannot render report: {err}");
                return ExitCode::FAILURE;
            }
        }
    };
    match &report_path {
        Some(path) => {
            if let Err(err) = fs::write(path, &rendered) {
                eprintln!("cannot write report {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => println!("{rendered}"),
    }

    if let Some(path) = &log {
        match sha256_hex(path) {
            Ok(digest) => println!("log sha256: {digest}"),
            Err(err) => eprintln!("cannot checksum log {}: {err}", path.display()),
        }
    }

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        eprintln!("{} invariant violations", report.violations.len());
        ExitCode::FAILURE
    }
}

//! Trace harness for the fixheap allocator.
//!
//! This crate provides:
//! - Trace execution: drive a `HeapAllocator` with a deterministic,
//!   seeded stream of alloc/realloc/free/reset operations while a
//!   shadow table cross-checks every intermediate state
//! - Structured logging: JSONL log records with schema validation and
//!   SHA-256 artifact checksums
//! - Report generation: human-readable + machine-readable run reports

#![forbid(unsafe_code)]

pub mod report;
pub mod structured_log;
pub mod trace;

pub use report::TraceReport;
pub use trace::{TraceConfig, run_trace};

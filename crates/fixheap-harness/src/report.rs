//! Trace run reports.
//!
//! One [`TraceReport`] per run, serializable for machine consumption
//! and renderable as a short markdown summary for humans.

use serde::{Deserialize, Serialize};

use crate::trace::TraceConfig;

/// Machine-readable outcome of one trace run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceReport {
    pub seed: u64,
    pub arena_len: usize,
    pub ops_executed: usize,
    pub allocs_attempted: u64,
    pub allocs_succeeded: u64,
    pub oom_events: u64,
    pub frees: u64,
    pub reallocs: u64,
    pub double_frees_injected: u64,
    pub resets: u64,
    pub peak_live_bytes: usize,
    pub final_total_available: usize,
    pub final_largest_available: usize,
    pub final_block_count: usize,
    /// Invariant violations observed during the run; empty means pass.
    pub violations: Vec<String>,
}

impl TraceReport {
    #[must_use]
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            seed: config.seed,
            arena_len: config.arena_len,
            ops_executed: 0,
            allocs_attempted: 0,
            allocs_succeeded: 0,
            oom_events: 0,
            frees: 0,
            reallocs: 0,
            double_frees_injected: 0,
            resets: 0,
            peak_live_bytes: 0,
            final_total_available: 0,
            final_largest_available: 0,
            final_block_count: 0,
            violations: Vec::new(),
        }
    }

    /// Whether the run observed no invariant violations.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Renders a short human-readable summary.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# fixheap trace report\n\n");
        out.push_str(&format!(
            "Seed `{:#x}`, {} ops over a {} byte arena: **{}**\n\n",
            self.seed,
            self.ops_executed,
            self.arena_len,
            if self.is_clean() { "PASS" } else { "FAIL" }
        ));
        out.push_str("| metric | value |\n|---|---|\n");
        out.push_str(&format!(
            "| allocations | {} / {} attempted |\n",
            self.allocs_succeeded, self.allocs_attempted
        ));
        out.push_str(&format!("| out-of-memory events | {} |\n", self.oom_events));
        out.push_str(&format!("| frees | {} |\n", self.frees));
        out.push_str(&format!("| reallocs | {} |\n", self.reallocs));
        out.push_str(&format!(
            "| double frees injected | {} |\n",
            self.double_frees_injected
        ));
        out.push_str(&format!("| resets | {} |\n", self.resets));
        out.push_str(&format!("| peak live bytes | {} |\n", self.peak_live_bytes));
        out.push_str(&format!(
            "| final free / largest | {} / {} |\n",
            self.final_total_available, self.final_largest_available
        ));
        out.push_str(&format!("| final block count | {} |\n", self.final_block_count));
        if !self.violations.is_empty() {
            out.push_str("\n## Violations\n\n");
            for v in &self.violations {
                out.push_str(&format!("- {v}\n"));
            }
        }
        out
    }
}

//! Outcome of a deobfuscation run.

use std::{fmt::Write as _, time::Duration};

use crate::deobfuscation::changes::{DerivedStats, EventLog};

/// Result of [`DeobfuscationEngine::process`](crate::deobfuscation::DeobfuscationEngine::process).
#[derive(Debug)]
pub struct DeobfuscationResult {
    /// Every event recorded during the run.
    pub events: EventLog,
    /// Pipeline iterations performed, including the final one that changed nothing.
    pub iterations: usize,
    /// Wall-clock time of the run.
    pub total_time: Duration,
}

impl DeobfuscationResult {
    /// Creates a result holding `events`, with no timing information.
    #[must_use]
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            iterations: 0,
            total_time: Duration::ZERO,
        }
    }

    /// Attaches timing information.
    #[must_use]
    pub fn with_timing(mut self, total_time: Duration, iterations: usize) -> Self {
        self.total_time = total_time;
        self.iterations = iterations;
        self
    }

    /// Statistics derived from the event log.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        self.events.stats()
    }

    /// Returns `true` if the run changed the program.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.stats().is_empty()
    }

    /// One-line summary of the statistics, or "No changes".
    #[must_use]
    pub fn summary(&self) -> String {
        self.stats().to_string()
    }

    /// Multi-line summary with timing and per-kind event counts.
    #[must_use]
    pub fn detailed_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Deobfuscation complete in {:.2?} ({} iterations)",
            self.total_time, self.iterations
        );
        let _ = writeln!(out, "  {}", self.summary());
        for (kind, count) in self.events.counts_by_kind() {
            let _ = writeln!(out, "  {kind}: {count}");
        }
        out
    }
}

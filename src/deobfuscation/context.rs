//! Shared state of one deobfuscation run.
//!
//! The [`AnalysisContext`] is handed to every pass. It is shared by reference between
//! the rayon workers running per-method passes, so all mutable state uses thread-safe
//! collections.

use std::time::{Duration, Instant};

use dashmap::DashSet;

use crate::{
    deobfuscation::{changes::EventLog, config::EngineConfig},
    program::MethodRef,
};

/// Analysis context for the pass pipeline.
pub struct AnalysisContext {
    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Engine configuration (for pass-specific limits).
    pub config: EngineConfig,

    /// Methods whose body was changed by at least one pass.
    pub modified_methods: DashSet<MethodRef>,

    /// Methods a pass failed on and left untouched.
    pub failed_methods: DashSet<MethodRef>,

    /// When the run started.
    start_time: Instant,
}

impl AnalysisContext {
    /// Creates a context for a run with `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            events: EventLog::new(),
            config,
            modified_methods: DashSet::new(),
            failed_methods: DashSet::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Records that a pass changed `method`.
    pub fn mark_modified(&self, method: &MethodRef) {
        self.modified_methods.insert(method.clone());
    }

    /// Returns `true` if some pass changed `method`.
    #[must_use]
    pub fn is_modified(&self, method: &MethodRef) -> bool {
        self.modified_methods.contains(method)
    }

    /// Records that a pass failed on `method`.
    pub fn mark_failed(&self, method: &MethodRef) {
        self.failed_methods.insert(method.clone());
    }

    /// Consumes the context, returning the event log.
    #[must_use]
    pub fn into_events(self) -> EventLog {
        self.events
    }
}

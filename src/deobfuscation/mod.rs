//! Deobfuscation passes over decoded class files.
//!
//! This module turns the provenance information of [`crate::analysis`] into program
//! rewrites. Passes never edit an instruction sequence directly: every deletion goes
//! through the [`RemovalProtocol`], which lets each instruction kind decide how it is
//! retired and keeps the provenance graph consistent with the code.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    DeobfuscationEngine                        │
//! │  EngineConfig ──► PassScheduler (fixpoint, max_iterations)    │
//! │                        │                                      │
//! │        ┌───────────────┼─────────────────────┐                │
//! │        ▼               ▼                     ▼                │
//! │  UnusedMethodsPass  UnusedFieldsPass  DeadStoreEliminationPass│
//! │     (global)          (global)        (per method, rayon)     │
//! │                                              │                │
//! │                                 MethodExecution + Removal     │
//! │                                 Protocol on a staged Code     │
//! │                                                               │
//! │  AnalysisContext { events: EventLog, config, ... }            │
//! └───────────────────────────────┬───────────────────────────────┘
//!                                 ▼
//!              DeobfuscationResult (events, stats, timing)
//! ```
//!
//! # Key Components
//!
//! - [`DeobfuscationEngine`] - Builds the pipeline and runs it to a fixpoint
//! - [`EngineConfig`] / [`CleanupConfig`] - Pass selection and limits
//! - [`DeobfuscationPass`] - Trait implemented by every pass
//! - [`RemovalProtocol`] - Cooperative instruction removal
//! - [`EventLog`] - Thread-safe record of every change
//! - [`DeobfuscationResult`] - Outcome of one run
//!
//! # Example
//!
//! ```rust
//! use classdeob::deobfuscation::{DeobfuscationEngine, EngineConfig};
//! use classdeob::program::Program;
//!
//! let mut program = Program::new();
//! let mut engine = DeobfuscationEngine::new(EngineConfig::default());
//! let result = engine.process(&mut program)?;
//! assert_eq!(result.summary(), "No changes");
//! # Ok::<(), classdeob::Error>(())
//! ```

mod changes;
mod config;
mod context;
mod engine;
mod pass;
mod removal;
mod result;
mod scheduler;

pub mod passes;

pub use changes::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use config::{CleanupConfig, EngineConfig};
pub use context::AnalysisContext;
pub use engine::DeobfuscationEngine;
pub use pass::DeobfuscationPass;
pub use passes::{DeadStoreEliminationPass, UnusedFieldsPass, UnusedMethodsPass};
pub use removal::{RemovalDecision, RemovalProtocol, RemovalReport};
pub use result::DeobfuscationResult;
pub use scheduler::PassScheduler;

//! Stack-provenance abstract execution.
//!
//! This module abstractly executes method bodies one instruction at a time and records,
//! for every value that passes through the operand stack, which instruction execution
//! produced it and which consumed it. The result is a [`ProvenanceGraph`] per method that
//! the transformation passes in [`crate::deobfuscation`] query and edit.
//!
//! # Architecture
//!
//! ```text
//! Method ──► Frame::for_method ──► Instruction::execute (per instruction)
//!                                      │
//!                                      ├─► InstructionStep::pop / push
//!                                      │       ├─► Stack            (frame)
//!                                      │       └─► ExecutionContext (graph)
//!                                      ▼
//!                               MethodExecution { graph, frame, contexts }
//! ```
//!
//! # Key Components
//!
//! - [`ValueNode`] - One value in one stack slot, with its producer and consumers
//! - [`ExecutionContext`] - One instruction's single execution: ordered pops and pushes
//! - [`ProvenanceGraph`] - Arena owning nodes and contexts, addressed by id
//! - [`Frame`] / [`Stack`] - Operand stack and locals of one linear pass
//! - [`InstructionStep`] - The only way to mutate the stack
//! - [`Duplication`] - Provenance queries for `dup`-family instructions
//! - [`MethodExecution`] / [`ProgramExecution`] - Drivers
//!
//! # Scope
//!
//! The walk is linear: branch targets are not followed and there is no merging of
//! stack states. Every instruction is executed exactly once, in sequence order.
//!
//! # Thread Safety
//!
//! A method analysis is single-threaded. Different methods share nothing and are
//! analysed in parallel by [`ProgramExecution`].

mod context;
mod execution;
mod frame;
mod graph;
mod interpreter;
mod value;

pub use context::{ContextId, ExecutionContext};
pub use execution::{MethodExecution, ProgramExecution};
pub use frame::{Frame, FrameId, InstructionStep, LocalSlot, Stack};
pub use graph::ProvenanceGraph;
pub use interpreter::Duplication;
pub use value::{AbstractValue, ValueId, ValueNode};

//! # classdeob Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classdeob library. Import this module to get quick access to the essential
//! types for building programs, analysing them and running the engine.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classdeob operations
pub use crate::Error;

/// The result type used throughout classdeob
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Classes, members and the program that holds them
pub use crate::program::{ClassFile, Field, Method, Program};

/// Symbolic member references and descriptors
pub use crate::program::{FieldRef, MethodDescriptor, MethodRef, ValueType};

/// Access flags
pub use crate::program::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};

/// Instruction sequences and how to build them
pub use crate::program::{Code, CodeAssembler, Instruction, InstructionId, InstructionKind};

// ================================================================================================
// Analysis
// ================================================================================================

/// Abstract execution drivers
pub use crate::analysis::{MethodExecution, ProgramExecution};

/// Provenance graph and its nodes
pub use crate::analysis::{AbstractValue, ContextId, ProvenanceGraph, ValueId};

// ================================================================================================
// Deobfuscation
// ================================================================================================

/// Engine entry point and configuration
pub use crate::deobfuscation::{CleanupConfig, DeobfuscationEngine, EngineConfig};

/// Pass trait and built-in passes
pub use crate::deobfuscation::{
    DeadStoreEliminationPass, DeobfuscationPass, UnusedFieldsPass, UnusedMethodsPass,
};

/// Removal protocol
pub use crate::deobfuscation::{RemovalDecision, RemovalProtocol};

/// Results and events
pub use crate::deobfuscation::{DeobfuscationResult, EventKind, EventLog};

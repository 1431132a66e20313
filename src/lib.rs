// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # classdeob
//!
//! A stack-provenance engine for cleaning up obfuscated JVM class files.
//!
//! `classdeob` abstractly executes method bodies one instruction at a time and records,
//! for every value on the operand stack, which instruction execution pushed it and
//! which popped it. Transformation passes use that provenance to delete dead code
//! without breaking the stack discipline of what remains, and to strip class members
//! that nothing references.
//!
//! ## Features
//!
//! - **Provenance graph** - Every stack value knows its producer and its consumers
//! - **Duplication awareness** - `dup` aliases can be traced back to the value they copy
//! - **Cooperative removal** - Each instruction kind decides how it is retired when its
//!   result is no longer needed
//! - **Member cleanup** - Unused fields (and optionally methods) are removed program-wide
//! - **Parallel** - Methods are analysed and transformed in parallel with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use classdeob::prelude::*;
//!
//! let mut asm = CodeAssembler::new();
//! asm.aload(0)
//!     .getfield("demo/Counter", "value", "I")?
//!     .istore(1)
//!     .return_();
//!
//! let class = ClassFile::new("demo/Counter", Some("java/lang/Object"), ClassAccessFlags::PUBLIC)
//!     .with_field(Field::new("value", "I", FieldAccessFlags::PRIVATE)?)
//!     .with_field(Field::new("padding", "J", FieldAccessFlags::PRIVATE)?)
//!     .with_method(
//!         Method::new("touch", "()V", MethodAccessFlags::PUBLIC)?.with_code(asm.finish()?),
//!     );
//! let mut program = Program::new().with_class(class);
//!
//! let mut engine = DeobfuscationEngine::new(EngineConfig::default());
//! let result = engine.process(&mut program)?;
//! println!("{}", result.detailed_summary());
//! # Ok::<(), classdeob::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`program`] - The decoded class-file model: classes, members, descriptors and
//!   instruction sequences, plus [`program::CodeAssembler`] to build bodies
//! - [`analysis`] - Abstract execution: frames, execution contexts, value nodes and the
//!   provenance graph
//! - [`deobfuscation`] - The removal protocol, the passes, and the engine that runs them
//!   to a fixpoint
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Scope
//!
//! Class-file parsing and writing happen outside this crate: a loader builds a
//! [`program::Program`], the engine mutates it in place, and a writer re-encodes it. The
//! abstract execution is a linear walk over each body and does not follow branches.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use classdeob::{program::FieldRef, Error};
//!
//! match FieldRef::new("a/B", "broken", "Q") {
//!     Ok(field) => println!("parsed {field}"),
//!     Err(Error::Malformed { message, .. }) => println!("Malformed descriptor: {message}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classdeob::prelude::*;
///
/// let mut engine = DeobfuscationEngine::default();
/// let result = engine.process(&mut Program::new())?;
/// assert_eq!(result.summary(), "No changes");
/// # Ok::<(), classdeob::Error>(())
/// ```
pub mod prelude;

/// The decoded class-file model.
///
/// Classes, fields and methods with their access flags, symbolic member references,
/// parsed descriptors, and method bodies as sequences of typed instructions.
pub mod program;

/// Stack-provenance abstract execution of method bodies.
pub mod analysis;

/// Transformation passes and the engine that runs them.
pub mod deobfuscation;

/// `classdeob` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classdeob` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use classdeob::{analysis::MethodExecution, program::{CodeAssembler, Method, MethodAccessFlags}, Error};
///
/// let mut asm = CodeAssembler::new();
/// asm.iadd().ireturn();
/// let method = Method::new("sum", "()I", MethodAccessFlags::STATIC)?.with_code(asm.finish()?);
///
/// assert!(matches!(
///     MethodExecution::run(&method),
///     Err(Error::StackUnderflow { pc: 0, .. })
/// ));
/// # Ok::<(), classdeob::Error>(())
/// ```
pub use error::Error;

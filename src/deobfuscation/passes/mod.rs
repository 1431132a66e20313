//! Built-in deobfuscation passes.
//!
//! Each pass implements [`DeobfuscationPass`](crate::deobfuscation::DeobfuscationPass)
//! and records its modifications as events in the shared
//! [`EventLog`](crate::deobfuscation::EventLog).
//!
//! | Pass | Scope | Description |
//! |------|-------|-------------|
//! | [`UnusedMethodsPass`] | global | Removes methods no invocation can reach (off by default) |
//! | [`UnusedFieldsPass`] | global | Removes fields no instruction accesses |
//! | [`DeadStoreEliminationPass`] | per method | Removes unread stores and redundant pops through the removal protocol |
//!
//! The [`DeobfuscationEngine`](crate::deobfuscation::DeobfuscationEngine) registers
//! them in the order of this table.

mod dead_stores;
mod unused_fields;
mod unused_methods;

pub use dead_stores::DeadStoreEliminationPass;
pub use unused_fields::UnusedFieldsPass;
pub use unused_methods::{MethodUsage, UnusedMethodsPass};

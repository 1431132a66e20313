//! Pass traits and infrastructure for the deobfuscation pipeline.
//!
//! This module defines the [`DeobfuscationPass`] trait that all passes implement.
//! A pass is either *global* (it sees and mutates the whole [`Program`], like unused
//! member removal) or *per-method* (it rewrites one method body at a time and may run
//! in parallel with itself on other methods).

use crate::{
    deobfuscation::context::AnalysisContext,
    program::{ClassFile, Method, Program},
    Result,
};

/// A transformation pass over a program.
///
/// All passes must be thread-safe (Send + Sync) to allow parallel execution.
/// Per-method passes receive mutable access to one method and shared access to the
/// analysis context; global passes receive the whole program.
///
/// # Atomicity
///
/// A pass either applies all of its changes to a unit (a method for per-method passes,
/// the program for global ones) or none: on error the unit must be left as it was.
pub trait DeobfuscationPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific method?
    ///
    /// Called before `run_on_method`. The default skips methods without code.
    fn should_run(&self, _class: &ClassFile, method: &Method, _ctx: &AnalysisContext) -> bool {
        method.code.is_some()
    }

    /// Run the pass on a single method.
    ///
    /// This is the main entry point for per-method passes.
    /// Returns `true` if any changes were made, `false` otherwise.
    /// Events should be recorded directly to `ctx.events`.
    ///
    /// # Arguments
    ///
    /// * `class` - Internal name of the declaring class.
    /// * `method` - The method to transform.
    /// * `ctx` - The analysis context (thread-safe, uses shared reference).
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the method. The method must be
    /// unchanged in that case.
    fn run_on_method(&self, class: &str, method: &mut Method, ctx: &AnalysisContext)
        -> Result<bool>;

    /// Run on the entire program (for interprocedural passes).
    ///
    /// Override this for passes that need to see all methods at once.
    /// Returns `true` if any changes were made, `false` otherwise.
    /// Events should be recorded directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the program.
    fn run_global(&self, _program: &mut Program, _ctx: &AnalysisContext) -> Result<bool> {
        Ok(false)
    }

    /// Does this pass operate globally (across all methods)?
    ///
    /// Global passes have their `run_global` called instead of
    /// iterating over methods with `run_on_method`.
    fn is_global(&self) -> bool {
        false
    }

    /// Called once before the pass runs in an iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &AnalysisContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass completes in an iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &AnalysisContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

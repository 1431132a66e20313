//! Main deobfuscation engine.
//!
//! The [`DeobfuscationEngine`] is the main entry point for cleaning up a decoded
//! [`Program`]. It builds the pass pipeline from an [`EngineConfig`], runs it to a
//! fixpoint and reports what changed.

use crate::{
    deobfuscation::{
        config::EngineConfig,
        context::AnalysisContext,
        pass::DeobfuscationPass,
        passes::{DeadStoreEliminationPass, UnusedFieldsPass, UnusedMethodsPass},
        result::DeobfuscationResult,
        scheduler::PassScheduler,
    },
    program::Program,
    Result,
};

/// Main deobfuscation engine.
///
/// The engine runs its passes in registration order, repeatedly, until one complete
/// iteration changes nothing or `max_iterations` is reached:
///
/// 1. **Unused methods** (only with `cleanup.remove_unused_methods`)
/// 2. **Unused fields** (with `cleanup.remove_unused_fields`)
/// 3. **Dead stores** (with `enable_dead_store_elimination`)
///
/// Removing a method can orphan the fields only it accessed, and removing a dead store
/// can leave a `dup` or a pure value behind a `pop`, which is why the pipeline iterates.
/// Field reads count as side effects: a dead store fed by one keeps the read and gets a
/// `pop` instead.
///
/// # Example
///
/// ```rust
/// use classdeob::deobfuscation::{DeobfuscationEngine, EngineConfig};
/// use classdeob::program::{ClassAccessFlags, ClassFile, Field, FieldAccessFlags, Program};
///
/// let class = ClassFile::new("a/Padded", Some("java/lang/Object"), ClassAccessFlags::PUBLIC)
///     .with_field(Field::new("junk", "J", FieldAccessFlags::PRIVATE)?);
/// let mut program = Program::new().with_class(class);
///
/// let mut engine = DeobfuscationEngine::new(EngineConfig::default());
/// let result = engine.process(&mut program)?;
///
/// assert_eq!(result.stats().fields_removed, 1);
/// println!("{}", result.summary());
/// # Ok::<(), classdeob::Error>(())
/// ```
pub struct DeobfuscationEngine {
    /// Configuration.
    config: EngineConfig,
    /// Pass scheduler.
    scheduler: PassScheduler,
}

impl Default for DeobfuscationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DeobfuscationEngine {
    /// Creates a new engine with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration controlling pass selection, iteration limits and
    ///   error tolerance.
    ///
    /// # Returns
    ///
    /// A new `DeobfuscationEngine` with the enabled built-in passes registered.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let mut scheduler = PassScheduler::new(config.max_iterations);

        if config.cleanup.remove_unused_methods {
            scheduler.add(Box::new(UnusedMethodsPass::new()));
        }
        if config.cleanup.remove_unused_fields {
            scheduler.add(Box::new(UnusedFieldsPass::new()));
        }
        if config.enable_dead_store_elimination {
            scheduler.add(Box::new(DeadStoreEliminationPass::new()));
        }

        Self { config, scheduler }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Appends a custom pass after the built-in ones.
    pub fn register_pass(&mut self, pass: Box<dyn DeobfuscationPass>) {
        self.scheduler.add(pass);
    }

    /// Names of the registered passes, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.scheduler.pass_names()
    }

    /// Runs the pipeline over `program`, mutating it in place.
    ///
    /// # Arguments
    ///
    /// * `program` - The program to clean up.
    ///
    /// # Returns
    ///
    /// A [`DeobfuscationResult`] with the event log, iteration count and timing.
    ///
    /// # Errors
    ///
    /// Returns an error if a global pass fails, or if a per-method pass fails while
    /// `continue_on_error` is off. Methods a pass failed on are left as they were.
    pub fn process(&mut self, program: &mut Program) -> Result<DeobfuscationResult> {
        let ctx = AnalysisContext::new(self.config.clone());
        let iterations = self.scheduler.run_pipeline(&ctx, program)?;
        let elapsed = ctx.elapsed();

        Ok(DeobfuscationResult::new(ctx.into_events()).with_timing(elapsed, iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deobfuscation::{CleanupConfig, EventKind},
        test::factories::{broken_program, fields_program},
    };

    #[test]
    fn test_engine_default() {
        let engine = DeobfuscationEngine::default();

        assert!(engine.config().cleanup.remove_unused_fields);
        assert_eq!(engine.pass_names(), vec!["unused-fields", "dead-stores"]);
    }

    #[test]
    fn test_engine_aggressive() {
        let engine = DeobfuscationEngine::new(EngineConfig::aggressive());

        assert_eq!(
            engine.pass_names(),
            vec!["unused-methods", "unused-fields", "dead-stores"]
        );
    }

    #[test]
    fn test_engine_no_passes() {
        let config = EngineConfig {
            enable_dead_store_elimination: false,
            cleanup: CleanupConfig::disabled(),
            ..EngineConfig::default()
        };
        let mut engine = DeobfuscationEngine::new(config);
        let mut program = fields_program();

        let result = engine.process(&mut program).unwrap();

        assert_eq!(result.summary(), "No changes");
        assert_eq!(program.field_count(), 2);
    }

    #[test]
    fn test_process_reaches_fixpoint() {
        let mut engine = DeobfuscationEngine::default();
        let mut program = fields_program();

        let result = engine.process(&mut program).unwrap();

        assert_eq!(result.stats().fields_removed, 1);
        assert_eq!(result.iterations, 2);

        let again = engine.process(&mut program).unwrap();
        assert_eq!(again.summary(), "No changes");
        assert_eq!(again.iterations, 1);
    }

    #[test]
    fn test_process_skips_broken_methods() {
        let mut engine = DeobfuscationEngine::default();
        let mut program = broken_program();
        let before = program.clone();

        let result = engine.process(&mut program).unwrap();

        assert_eq!(result.events.count_kind(EventKind::Warning), 1);
        let broken = before.class("test/Broken").unwrap();
        assert_eq!(program.class("test/Broken").unwrap().methods, broken.methods);
    }
}

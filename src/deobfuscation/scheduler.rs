//! Pass scheduler for orchestrating pass execution.
//!
//! The `PassScheduler` runs an ordered list of [`DeobfuscationPass`]es over a
//! [`Program`] until an iteration changes nothing or the iteration limit is reached.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::{
    deobfuscation::{changes::EventKind, context::AnalysisContext, pass::DeobfuscationPass},
    program::{ClassFile, Program},
    Error, Result,
};

/// Orchestrates pass execution to a fixpoint.
///
/// Within one iteration every pass runs once, in registration order. Global passes see
/// the whole program; per-method passes run for every method they accept, in parallel
/// across classes when the configuration allows it.
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Registered passes, in execution order.
    passes: Vec<Box<dyn DeobfuscationPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PassScheduler {
    /// Creates a new scheduler without passes.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    ///
    /// # Returns
    ///
    /// A new `PassScheduler`.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Appends a pass to the pipeline.
    pub fn add(&mut self, pass: Box<dyn DeobfuscationPass>) {
        self.passes.push(pass);
    }

    /// Names of the registered passes, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Returns the number of registered passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if no pass is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs one per-method pass over every method of `class` it accepts.
    ///
    /// Methods that failed earlier in the run are skipped. With
    /// `continue_on_error`, a failing method is recorded as a `Warning` event and left
    /// as it was; otherwise the error is returned. A contract violation is a bug in the
    /// pass and is always returned.
    fn run_on_class(
        pass: &dyn DeobfuscationPass,
        class: &mut ClassFile,
        ctx: &AnalysisContext,
    ) -> Result<bool> {
        let selected: Vec<usize> = class
            .methods
            .iter()
            .enumerate()
            .filter(|(_, method)| {
                !ctx.failed_methods.contains(&method.reference(class.name()))
                    && pass.should_run(class, method, ctx)
            })
            .map(|(index, _)| index)
            .collect();

        let owner = class.name().to_string();
        let mut changed = false;
        for index in selected {
            let method = &mut class.methods[index];
            match pass.run_on_method(&owner, method, ctx) {
                Ok(true) => changed = true,
                Ok(false) => {}
                Err(e @ Error::ContractViolation { .. }) => return Err(e),
                Err(e) if ctx.config.continue_on_error => {
                    let reference = method.reference(&owner);
                    ctx.events
                        .record(EventKind::Warning)
                        .method(&reference)
                        .message(format!("{} failed: {e}", pass.name()));
                    ctx.mark_failed(&reference);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(changed)
    }

    /// Runs all passes once over the program.
    ///
    /// Returns `true` if any pass made changes, `false` otherwise.
    fn run_passes_once(
        ctx: &AnalysisContext,
        passes: &mut [Box<dyn DeobfuscationPass>],
        program: &mut Program,
    ) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        for pass in passes.iter() {
            if pass.is_global() {
                if pass.run_global(program, ctx)? {
                    any_changed.store(true, Ordering::Relaxed);
                }
                continue;
            }

            let pass = pass.as_ref();
            let visit = |class: &mut ClassFile| -> Result<()> {
                if Self::run_on_class(pass, class, ctx)? {
                    any_changed.store(true, Ordering::Relaxed);
                }
                Ok(())
            };
            if ctx.config.parallel {
                program.classes_mut().par_iter_mut().try_for_each(visit)?;
            } else {
                program.classes_mut().iter_mut().try_for_each(visit)?;
            }
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }

    /// Runs the pipeline until an iteration changes nothing.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The analysis context; events accumulate in `ctx.events`.
    /// * `program` - The program to transform in place.
    ///
    /// # Returns
    ///
    /// The number of iterations completed, including the final one that found nothing
    /// to change.
    ///
    /// # Errors
    ///
    /// Returns an error if a global pass fails, if a per-method pass violates a
    /// duplication contract, or if a per-method pass fails while `continue_on_error`
    /// is off.
    pub fn run_pipeline(&mut self, ctx: &AnalysisContext, program: &mut Program) -> Result<usize> {
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            if !Self::run_passes_once(ctx, &mut self.passes, program)? {
                break;
            }
        }

        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicUsize, Arc};

    use super::*;
    use crate::{
        deobfuscation::EngineConfig,
        analysis::MethodExecution,
        program::{ClassAccessFlags, CodeAssembler, Method, MethodAccessFlags},
        test::factories::{broken_program, fields_program},
    };

    /// Reports a change for the first `changes` invocations.
    struct CountdownPass {
        remaining: AtomicUsize,
    }

    impl CountdownPass {
        fn new(changes: usize) -> Self {
            Self {
                remaining: AtomicUsize::new(changes),
            }
        }
    }

    impl DeobfuscationPass for CountdownPass {
        fn name(&self) -> &'static str {
            "countdown"
        }

        fn run_on_method(
            &self,
            _class: &str,
            _method: &mut Method,
            _ctx: &AnalysisContext,
        ) -> Result<bool> {
            Ok(self
                .remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok())
        }
    }

    struct FailingPass;

    impl DeobfuscationPass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run_on_method(
            &self,
            _class: &str,
            _method: &mut Method,
            _ctx: &AnalysisContext,
        ) -> Result<bool> {
            Err(Error::Unsupported("always fails".to_string()))
        }
    }

    /// Asks a `dup` for the original of a value the `dup` never pushed.
    struct MisusingPass {
        calls: Arc<AtomicUsize>,
    }

    impl DeobfuscationPass for MisusingPass {
        fn name(&self) -> &'static str {
            "misusing"
        }

        fn run_on_method(
            &self,
            _class: &str,
            method: &mut Method,
            _ctx: &AnalysisContext,
        ) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let execution = MethodExecution::run(method)?;
            let code = method.code.as_ref().unwrap();
            let source = execution.pushes_of(code.instructions()[0].id())[0];
            let dup = code.instructions()[1].as_duplication().unwrap();
            dup.original(execution.graph(), source)?;
            Ok(false)
        }
    }

    fn dup_program() -> Program {
        let mut class = ClassFile::new("test/Dups", None, ClassAccessFlags::PUBLIC);
        for name in ["first", "second"] {
            let mut asm = CodeAssembler::new();
            asm.iconst(3).dup().iadd().istore(0).return_();
            class = class.with_method(
                Method::new(name, "()V", MethodAccessFlags::STATIC)
                    .unwrap()
                    .with_code(asm.finish().unwrap()),
            );
        }
        Program::new().with_class(class)
    }

    #[test]
    fn test_contract_violation_stops_pipeline() {
        let mut program = dup_program();
        let ctx = AnalysisContext::new(EngineConfig::sequential());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PassScheduler::new(5);
        scheduler.add(Box::new(MisusingPass {
            calls: Arc::clone(&calls),
        }));

        let err = scheduler.run_pipeline(&ctx, &mut program).unwrap_err();

        assert!(matches!(err, Error::ContractViolation { .. }));
        assert_eq!(ctx.events.count_kind(EventKind::Warning), 0);
        assert!(ctx.failed_methods.is_empty());
        // The second method is never visited
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_default_scheduler() {
        let scheduler = PassScheduler::default();
        assert_eq!(scheduler.max_iterations, 10);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_pipeline_stops_at_fixpoint() {
        let mut program = fields_program();
        let ctx = AnalysisContext::new(EngineConfig::sequential());
        let mut scheduler = PassScheduler::new(10);
        scheduler.add(Box::new(CountdownPass::new(3)));

        let iterations = scheduler.run_pipeline(&ctx, &mut program).unwrap();

        // Two methods per iteration: changes in iterations 1 and 2, none in 3
        assert_eq!(iterations, 3);
    }

    #[test]
    fn test_pipeline_respects_iteration_limit() {
        let mut program = fields_program();
        let ctx = AnalysisContext::new(EngineConfig::sequential());
        let mut scheduler = PassScheduler::new(2);
        scheduler.add(Box::new(CountdownPass::new(100)));

        assert_eq!(scheduler.run_pipeline(&ctx, &mut program).unwrap(), 2);
    }

    #[test]
    fn test_failures_become_warnings() {
        let mut program = broken_program();
        let ctx = AnalysisContext::new(EngineConfig::default());
        let mut scheduler = PassScheduler::new(5);
        scheduler.add(Box::new(FailingPass));

        let iterations = scheduler.run_pipeline(&ctx, &mut program).unwrap();

        assert_eq!(iterations, 1);
        assert_eq!(ctx.events.count_kind(EventKind::Warning), 2);
        assert_eq!(ctx.failed_methods.len(), 2);
    }

    #[test]
    fn test_failures_abort_without_continue_on_error() {
        let mut program = broken_program();
        let ctx = AnalysisContext::new(EngineConfig::sequential().with_continue_on_error(false));
        let mut scheduler = PassScheduler::new(5);
        scheduler.add(Box::new(FailingPass));

        assert!(scheduler.run_pipeline(&ctx, &mut program).is_err());
    }

    #[test]
    fn test_pass_names() {
        let mut scheduler = PassScheduler::new(1);
        scheduler.add(Box::new(FailingPass));
        scheduler.add(Box::new(CountdownPass::new(0)));

        assert_eq!(scheduler.pass_names(), vec!["failing", "countdown"]);
        assert_eq!(scheduler.len(), 2);
    }
}
